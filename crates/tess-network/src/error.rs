//! Transport errors.
//!
//! Transport failures are soft: messages are dropped and sessions continue;
//! the cryptographic layer's round timeouts decide whether missing traffic
//! becomes fatal.

use crate::peer::PeerId;

/// Errors surfaced by channels and providers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The target peer is not known to the provider.
    #[error("unknown peer: {peer}")]
    UnknownPeer {
        /// The peer the operation targeted.
        peer: PeerId,
    },

    /// A send did not reach the transport.
    #[error("send failed on channel {channel}: {reason}")]
    SendFailed {
        /// Channel the send used.
        channel: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A payload could not be decoded into its registered type.
    #[error("failed to decode {message_type} payload: {reason}")]
    Decode {
        /// Type the payload claimed.
        message_type: String,
        /// Decoder error.
        reason: String,
    },

    /// The channel has been closed; no further sends are accepted.
    #[error("channel closed")]
    Closed,
}
