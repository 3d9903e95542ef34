//! Key material produced by DKG and the signature output type.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// This member's private share of the group key.
///
/// Zeroized on drop; the debug rendering never shows the bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretShare([u8; 32]);

impl SecretShare {
    /// Wrap raw scalar bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw scalar bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretShare(..)")
    }
}

/// The group's public ECDSA point as uncompressed coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPublicKey {
    /// X coordinate, big-endian.
    pub x: [u8; 32],
    /// Y coordinate, big-endian.
    pub y: [u8; 32],
}

impl GroupPublicKey {
    /// The 64-byte `X ‖ Y` form submitted on-chain.
    pub fn to_bytes(self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.x);
        out[32..].copy_from_slice(&self.y);
        out
    }

    /// Parse the 64-byte `X ‖ Y` form.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&bytes[..32]);
        y.copy_from_slice(&bytes[32..]);
        Self { x, y }
    }
}

impl fmt::Display for GroupPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}{}", hex::encode(self.x), hex::encode(self.y))
    }
}

/// Everything a member keeps from a successful DKG run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// This member's position in the canonical group ordering.
    pub party_index: u16,
    /// Dishonest threshold the key was generated for.
    pub threshold: u16,
    /// The group public key.
    pub public_key: GroupPublicKey,
    /// This member's private share.
    pub secret_share: SecretShare,
}

/// A finished ECDSA signature with its raw recovery id.
///
/// `recovery_id` is the protocol-level value in `{0, 1, 2, 3}`; chain
/// submission adds 27, nothing else does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureTriple {
    /// ECDSA `r` component, big-endian.
    pub r: [u8; 32],
    /// ECDSA `s` component, big-endian.
    pub s: [u8; 32],
    /// Recovery id in `{0, 1, 2, 3}`.
    pub recovery_id: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_round_trips_64_bytes() {
        let key = GroupPublicKey {
            x: [0x11; 32],
            y: [0x22; 32],
        };
        assert_eq!(GroupPublicKey::from_bytes(&key.to_bytes()), key);
    }

    #[test]
    fn secret_share_debug_is_redacted() {
        let share = SecretShare::from_bytes([7; 32]);
        assert_eq!(format!("{share:?}"), "SecretShare(..)");
    }
}
