//! Session-terminal errors.

use std::time::Duration;
use tess_core::{GroupError, MemberId};
use tess_ecdsa::ProtocolError;
use tess_network::TransportError;

/// Why a session ended without a result.
///
/// Transport jitter alone never produces one of these: send and decode
/// failures are logged and the session continues. A session fails on a
/// party-reported round failure, a failed readiness barrier, or
/// cancellation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The group descriptor was rejected before the session left INIT.
    #[error("invalid group: {0}")]
    Group(#[from] GroupError),

    /// Opening the session's channels failed.
    #[error("failed to open session channels: {0}")]
    Channels(#[from] TransportError),

    /// The cryptographic party reported a fatal round failure.
    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// Not every member announced readiness within the bound.
    #[error("readiness barrier expired after {timeout:?}, missing {missing} member(s)")]
    ReadyTimeout {
        /// The configured bound.
        timeout: Duration,
        /// Number of members never heard from.
        missing: usize,
        /// The members never heard from.
        absent: Vec<MemberId>,
    },

    /// The caller cancelled the session.
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether this failure is a cooperative cancellation (never logged as
    /// an error).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
