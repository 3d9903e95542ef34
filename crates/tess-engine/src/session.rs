//! The TSS session engine.
//!
//! One session drives one party machine from INIT to a terminal state:
//!
//! ```text
//! INIT -> STARTED -> (RUNNING ...)* -> DONE | FAILED
//! ```
//!
//! The engine owns both the bridge and the party and wires them through
//! channels, so neither holds a reference to the other. The first arrival
//! among {party result, party error, cancellation} decides the terminal
//! state; transport errors are logged and never terminal on their own.

use crate::bridge::NetworkBridge;
use crate::error::SessionError;
use crate::ready::await_group_ready;
use std::sync::Arc;
use std::time::Duration;
use tess_core::{CancelToken, GroupInfo, SessionId};
use tess_ecdsa::{KeyShare, PreParams, ProtocolError, ProtocolSuite, RunningParty, SignatureTriple};
use tess_network::{NetworkProvider, TransportError};
use tracing::{debug, info, warn};

/// Tunables of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the pre-protocol readiness barrier.
    pub ready_timeout: Duration,
    /// How often readiness is re-announced while waiting.
    pub ready_announce_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout: tess_core::defaults::READY_TIMEOUT,
            ready_announce_interval: Duration::from_millis(500),
        }
    }
}

/// Runs DKG and signing sessions against a protocol suite and a network
/// provider.
pub struct TssEngine {
    suite: Arc<dyn ProtocolSuite>,
    provider: Arc<dyn NetworkProvider>,
    config: SessionConfig,
}

impl TssEngine {
    /// Engine with default timeouts.
    pub fn new(suite: Arc<dyn ProtocolSuite>, provider: Arc<dyn NetworkProvider>) -> Self {
        Self::with_config(suite, provider, SessionConfig::default())
    }

    /// Engine with explicit timeouts.
    pub fn with_config(
        suite: Arc<dyn ProtocolSuite>,
        provider: Arc<dyn NetworkProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            suite,
            provider,
            config,
        }
    }

    /// Run a distributed key generation session for `group`.
    pub async fn run_keygen(
        &self,
        group: &GroupInfo,
        pre_params: PreParams,
        cancel: CancelToken,
    ) -> Result<KeyShare, SessionError> {
        let session = SessionId::for_keygen(group.keep_id());
        let suite = self.suite.clone();
        self.drive(group, &session, cancel, move |group, session| {
            suite.start_keygen(group, session, pre_params)
        })
        .await
    }

    /// Run a signing session over `digest` for `group`.
    ///
    /// The output carries the raw recovery id in `{0, 1, 2, 3}`; chain
    /// conventions are applied by the submitter, not here.
    pub async fn run_signing(
        &self,
        group: &GroupInfo,
        share: &KeyShare,
        digest: [u8; 32],
        cancel: CancelToken,
    ) -> Result<SignatureTriple, SessionError> {
        let session = SessionId::for_signing(group.keep_id(), &digest);
        let suite = self.suite.clone();
        let share = share.clone();
        self.drive(group, &session, cancel, move |group, session| {
            suite.start_signing(group, session, &share, digest)
        })
        .await
    }

    async fn drive<O, F>(
        &self,
        group: &GroupInfo,
        session: &SessionId,
        cancel: CancelToken,
        start: F,
    ) -> Result<O, SessionError>
    where
        F: FnOnce(&GroupInfo, &SessionId) -> Result<RunningParty<O>, ProtocolError>,
    {
        debug!(keep = %group.keep_id(), %session, "session INIT");
        let mut bridge = NetworkBridge::open(self.provider.as_ref(), group, session).await?;
        let result = self
            .drive_with_bridge(&mut bridge, group, session, cancel, start)
            .await;
        bridge.close();
        match &result {
            Ok(_) => info!(keep = %group.keep_id(), %session, "session DONE"),
            Err(e) if e.is_cancellation() => {
                info!(keep = %group.keep_id(), %session, "session cancelled");
            }
            Err(e) => warn!(keep = %group.keep_id(), %session, error = %e, "session FAILED"),
        }
        result
    }

    async fn drive_with_bridge<O, F>(
        &self,
        bridge: &mut NetworkBridge,
        group: &GroupInfo,
        session: &SessionId,
        mut cancel: CancelToken,
        start: F,
    ) -> Result<O, SessionError>
    where
        F: FnOnce(&GroupInfo, &SessionId) -> Result<RunningParty<O>, ProtocolError>,
    {
        let mut inbound = bridge
            .take_inbound()
            .ok_or(SessionError::Channels(TransportError::Closed))?;
        let mut errors = bridge
            .take_errors()
            .ok_or(SessionError::Channels(TransportError::Closed))?;

        // No party exists until the whole group is listening.
        let broadcast_channel = bridge.broadcast_channel();
        let barrier = await_group_ready(
            &broadcast_channel,
            group,
            session,
            self.config.ready_timeout,
            self.config.ready_announce_interval,
        );
        tokio::select! {
            outcome = barrier => outcome?,
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
        }

        let mut party = start(group, session)?;
        debug!(keep = %group.keep_id(), %session, "session STARTED");

        // Inbound forwarding runs independently so a full party mailbox
        // never wedges the outbound path.
        let party_inbound = party.inbound.clone();
        let forward = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if party_inbound.send(message).await.is_err() {
                    return;
                }
            }
        });

        let result = loop {
            tokio::select! {
                outcome = &mut party.done => {
                    break match outcome {
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(e)) => Err(SessionError::Protocol(e)),
                        Err(_) => Err(SessionError::Protocol(ProtocolError::Terminated)),
                    };
                }
                Some(message) = party.outbound.recv() => {
                    if let Err(e) = bridge.send(&message).await {
                        warn!(keep = %group.keep_id(), error = %e, "outbound send failed");
                    }
                }
                Some(e) = errors.recv() => {
                    warn!(keep = %group.keep_id(), error = %e, "transport error in session");
                }
                _ = cancel.cancelled() => {
                    break Err(SessionError::Cancelled);
                }
            }
        };

        // The party may resolve with its last messages still queued; flush
        // them so peers that are not yet done can finish.
        if result.is_ok() {
            while let Ok(message) = party.outbound.try_recv() {
                if let Err(e) = bridge.send(&message).await {
                    warn!(keep = %group.keep_id(), error = %e, "final flush send failed");
                }
            }
        }
        forward.abort();
        result
    }
}
