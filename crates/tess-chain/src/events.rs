//! Chain-side event and value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use tess_core::{KeepId, MemberId};

/// A 20-byte chain address (operators, applications).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parse from a `0x`-prefixed or bare hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(array))
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A new keep was opened on-chain.
#[derive(Debug, Clone)]
pub struct KeepCreated {
    /// The keep's address.
    pub keep_id: KeepId,
    /// Group membership decided by the ledger.
    pub members: Vec<MemberId>,
    /// Maximum tolerated number of dishonest members.
    pub dishonest_threshold: usize,
    /// Application that opened the keep.
    pub application: Address,
}

/// The ledger requested a signature over a digest.
#[derive(Debug, Clone, Copy)]
pub struct SignatureRequested {
    /// The 32-byte digest to sign, as-is (the engine does not hash).
    pub digest: [u8; 32],
}

/// A keep was closed on-chain; the operator stops serving it.
#[derive(Debug, Clone, Copy)]
pub struct KeepClosed;

/// Signature in the ledger's submission format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSignature {
    /// ECDSA `r` component.
    pub r: [u8; 32],
    /// ECDSA `s` component.
    pub s: [u8; 32],
    /// Recovery value in chain convention (`recovery_id + 27`).
    pub v: u8,
}
