//! Chain operation errors.

use tess_core::KeepId;

/// Errors surfaced by a [`crate::ChainHandle`] implementation.
///
/// Transient failures are retried by callers with bounded backoff;
/// permanent ones are surfaced per keep.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// The keep is not known to the chain.
    #[error("failed to find keep with address: [{address}]")]
    UnknownKeep {
        /// Address the lookup used.
        address: KeepId,
    },

    /// Connectivity problem talking to the ledger. Transient.
    #[error("chain connection failed: {reason}")]
    Connection {
        /// Reason for the failure.
        reason: String,
    },

    /// The ledger rejected a transaction. Permanent.
    #[error("transaction rejected: {reason}")]
    Rejected {
        /// Reason for the rejection.
        reason: String,
    },

    /// A subscription's upstream ended and must be re-established.
    #[error("chain subscription closed")]
    SubscriptionClosed,
}

impl ChainError {
    /// Connectivity error helper.
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Rejection error helper.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Whether retrying the operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::SubscriptionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keep_message_carries_address() {
        let err = ChainError::UnknownKeep {
            address: KeepId::new("0x0101"),
        };
        assert_eq!(err.to_string(), "failed to find keep with address: [0x0101]");
    }

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(ChainError::connection("rpc timeout").is_retryable());
        assert!(ChainError::SubscriptionClosed.is_retryable());
        assert!(!ChainError::rejected("out of gas").is_retryable());
        let unknown = ChainError::UnknownKeep {
            address: KeepId::new("0x01"),
        };
        assert!(!unknown.is_retryable());
    }
}
