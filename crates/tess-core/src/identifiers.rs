//! Core identifier types used across the tess node
//!
//! Members are identified by the bytes of their long-term network public
//! key, keeps by their chain address, and protocol sessions by an identifier
//! every group member can derive independently.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Errors produced when constructing a [`MemberId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemberIdError {
    /// The identifier byte string was empty.
    #[error("member id must not be empty")]
    Empty,
    /// The identifier is zero when interpreted as a big-endian integer.
    #[error("member id must be a strictly positive integer")]
    Zero,
}

/// Stable identifier of one operator within a keep.
///
/// Derived from the operator's long-term network public key. The byte string
/// must be interpretable as a strictly positive big-endian integer; the
/// cryptographic layer consumes members in ascending numeric order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Vec<u8>);

impl MemberId {
    /// Create a member id from raw bytes, rejecting empty or zero values.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, MemberIdError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(MemberIdError::Empty);
        }
        if bytes.iter().all(|b| *b == 0) {
            return Err(MemberIdError::Zero);
        }
        Ok(Self(bytes))
    }

    /// Derive a member id from a long-term network public key.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self, MemberIdError> {
        Self::from_bytes(public_key)
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The identifier with leading zero bytes stripped.
    ///
    /// Two byte strings denote the same integer exactly when their stripped
    /// forms are equal; ordering below compares stripped forms first.
    fn magnitude(&self) -> &[u8] {
        let first = self.0.iter().position(|b| *b != 0).unwrap_or(self.0.len());
        &self.0[first..]
    }
}

impl Ord for MemberId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.magnitude(), other.magnitude());
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            // Distinct encodings of the same integer stay totally ordered.
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for MemberId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", hex::encode(&self.0))
    }
}

/// Identifier of one keep: its chain address string.
///
/// Keeps are addressed on-chain by a 20-byte address; the string form is the
/// `0x`-prefixed lowercase hex rendering and doubles as the name of the
/// keep's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeepId(String);

impl KeepId {
    /// Create a keep id from an address string, normalizing to lowercase.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().to_lowercase())
    }

    /// Parse a keep id from 20 address bytes.
    pub fn from_address_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// The address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KeepId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for KeepId {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

/// Identifier of one protocol session.
///
/// Every member of a group must arrive at the same session id without
/// coordination, so ids are derived from the keep and the work at hand
/// rather than generated randomly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Session id for the key-generation run of a keep.
    pub fn for_keygen(keep: &KeepId) -> Self {
        Self::derive("keygen", keep, &[])
    }

    /// Session id for signing a digest under a keep.
    pub fn for_signing(keep: &KeepId, digest: &[u8; 32]) -> Self {
        Self::derive("signing", keep, digest)
    }

    fn derive(label: &str, keep: &KeepId, material: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"TESS_SESSION_ID");
        hasher.update(label.as_bytes());
        hasher.update(keep.as_str().as_bytes());
        hasher.update(material);
        Self(hex::encode(&hasher.finalize().as_bytes()[..16]))
    }

    /// The session id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_id_rejects_empty() {
        assert_eq!(MemberId::from_bytes(Vec::new()), Err(MemberIdError::Empty));
    }

    #[test]
    fn member_id_rejects_zero() {
        assert_eq!(
            MemberId::from_bytes(vec![0, 0, 0]),
            Err(MemberIdError::Zero)
        );
    }

    #[test]
    fn member_ids_order_numerically() {
        let small = MemberId::from_bytes(vec![0x02]).expect("id");
        let padded = MemberId::from_bytes(vec![0x00, 0x10]).expect("id");
        let large = MemberId::from_bytes(vec![0x01, 0x00]).expect("id");
        let mut members = vec![large.clone(), small.clone(), padded.clone()];
        members.sort();
        assert_eq!(members, vec![small, padded, large]);
    }

    #[test]
    fn keep_id_normalizes_case() {
        let keep = KeepId::new("0xAbCd");
        assert_eq!(keep.as_str(), "0xabcd");
    }

    #[test]
    fn session_ids_are_deterministic_per_keep_and_digest() {
        let keep = KeepId::new("0x01");
        let digest = [7u8; 32];
        assert_eq!(
            SessionId::for_signing(&keep, &digest),
            SessionId::for_signing(&keep, &digest)
        );
        assert_ne!(
            SessionId::for_keygen(&keep),
            SessionId::for_signing(&keep, &digest)
        );
    }
}
