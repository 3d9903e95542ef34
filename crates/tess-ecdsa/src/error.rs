//! Protocol-level errors reported by party machines.

/// Fatal errors from a cryptographic party machine.
///
/// A party that reports one of these has failed its session; the engine
/// releases the session's resources and surfaces the error upstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    /// A protocol round failed.
    #[error("{phase} round failed: {reason}")]
    Round {
        /// Phase or round that failed.
        phase: String,
        /// Reason reported by the party.
        reason: String,
    },

    /// Key material was malformed or inconsistent.
    #[error("invalid key material: {reason}")]
    KeyMaterial {
        /// Description of the defect.
        reason: String,
    },

    /// Pre-parameters generation failed or timed out.
    #[error("pre-parameters generation failed: {reason}")]
    PreParams {
        /// Reason for the failure.
        reason: String,
    },

    /// The party machine stopped without producing a result.
    #[error("party machine terminated unexpectedly")]
    Terminated,
}

impl ProtocolError {
    /// Round-failure helper.
    pub fn round(phase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Round {
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    /// Key-material helper.
    pub fn key_material(reason: impl Into<String>) -> Self {
        Self::KeyMaterial {
            reason: reason.into(),
        }
    }
}
