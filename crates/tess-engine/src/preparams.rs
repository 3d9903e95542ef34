//! Pool of pre-generated DKG parameters.
//!
//! Generation is expensive for real suites, so the pool keeps a small
//! number of bundles ahead of demand. A single background producer refills
//! the pool whenever a bundle is taken; each generation attempt is bounded
//! by a deadline.

use std::sync::Arc;
use std::time::Duration;
use tess_ecdsa::{PreParams, ProtocolError, ProtocolSuite};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Blocking pool of [`PreParams`] bundles.
pub struct PreParamsPool {
    rx: Mutex<mpsc::Receiver<PreParams>>,
}

impl PreParamsPool {
    /// Start a pool holding up to `target` bundles, generating each within
    /// `deadline`.
    pub fn start(suite: Arc<dyn ProtocolSuite>, target: usize, deadline: Duration) -> Self {
        let (tx, rx) = mpsc::channel(target.max(1));
        tokio::spawn(async move {
            loop {
                let bundle =
                    match tokio::time::timeout(deadline, suite.generate_pre_params()).await {
                        Ok(Ok(bundle)) => bundle,
                        Ok(Err(e)) => {
                            warn!(error = %e, "pre-parameters generation failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            continue;
                        }
                        Err(_) => {
                            warn!(deadline = ?deadline, "pre-parameters generation timed out");
                            continue;
                        }
                    };
                debug!("pre-parameters bundle generated");
                // Blocks while the pool is full; consumption resumes the
                // producer, so at most one generator is ever active.
                if tx.send(bundle).await.is_err() {
                    return;
                }
            }
        });
        Self { rx: Mutex::new(rx) }
    }

    /// Take one bundle, waiting for the producer if the pool is empty.
    pub async fn take(&self) -> Result<PreParams, ProtocolError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| ProtocolError::PreParams {
                reason: "pre-parameters producer stopped".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tess_ecdsa::LocalSuite;

    #[tokio::test]
    async fn pool_yields_fresh_bundles() {
        let pool = PreParamsPool::start(
            Arc::new(LocalSuite::new()),
            1,
            Duration::from_secs(5),
        );
        let first = pool.take().await.expect("bundle");
        let second = pool.take().await.expect("bundle");
        assert_ne!(first.entropy(), second.entropy());
    }
}
