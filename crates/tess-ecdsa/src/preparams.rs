//! Pre-computed DKG parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-member randomness required before DKG can start.
///
/// Expensive to compute for real suites (safe primes), so bundles are
/// generated ahead of time and pooled; generation is always bounded by a
/// deadline.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreParams {
    entropy: [u8; 32],
}

impl PreParams {
    /// Wrap generated material.
    pub fn new(entropy: [u8; 32]) -> Self {
        Self { entropy }
    }

    /// The raw material, mixed into the suite's key derivation.
    pub fn entropy(&self) -> &[u8; 32] {
        &self.entropy
    }
}

impl fmt::Debug for PreParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreParams(..)")
    }
}
