//! Cooperative cancellation for long-running operations.
//!
//! Every session and background loop takes a [`CancelToken`]; cancellation
//! interrupts the next suspension point. Tokens are cheap to clone and a
//! dropped [`CancelHandle`] cancels its tokens.

use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and its first token.
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        let token = CancelToken {
            rx,
            _keepalive: None,
        };
        (Self { tx }, token)
    }

    /// Signal cancellation to every token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Create an additional token observing this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps the sender of a detached token alive so the channel never
    // closes; `None` for tokens tied to a handle.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that never fires, for operations driven to completion.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is signalled (or the handle is dropped).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped: treat as cancelled.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (handle, mut token) = CancelHandle::new();
        assert!(!token.is_cancelled());
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let (handle, mut token) = CancelHandle::new();
        drop(handle);
        token.cancelled().await;
    }

    #[tokio::test]
    async fn never_token_stays_pending() {
        let mut token = CancelToken::never();
        let wait = tokio::time::timeout(std::time::Duration::from_millis(20), token.cancelled());
        assert!(wait.await.is_err());
    }
}
