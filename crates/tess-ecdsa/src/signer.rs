//! The persisted result of a successful DKG run.

use crate::keyshare::KeyShare;
use serde::{Deserialize, Serialize};
use tess_core::GroupInfo;

/// Current on-disk schema version.
const SCHEMA_VERSION: u8 = 1;

/// Errors from encoding or decoding a persisted signer.
#[derive(Debug, thiserror::Error)]
pub enum SignerCodecError {
    /// The file is empty or truncated.
    #[error("signer data is empty")]
    Empty,
    /// The leading schema byte is not one this build understands.
    #[error("unsupported signer schema version {0}")]
    UnsupportedVersion(u8),
    /// The body failed to encode.
    #[error("failed to encode signer: {0}")]
    Encode(String),
    /// The body failed to decode.
    #[error("failed to decode signer: {0}")]
    Decode(String),
}

/// A member's long-lived signing state for one keep: the group descriptor
/// and the key share produced by DKG.
///
/// This is the only long-lived secret the node produces. It must reach
/// stable storage before the group public key is published on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// The keep's signing group.
    pub group: GroupInfo,
    /// This member's DKG output.
    pub share: KeyShare,
}

impl Signer {
    /// Serialize with a leading schema-version byte.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SignerCodecError> {
        let body =
            bincode::serialize(self).map_err(|e| SignerCodecError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(SCHEMA_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize, checking the schema version first.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerCodecError> {
        let (&version, body) = bytes.split_first().ok_or(SignerCodecError::Empty)?;
        if version != SCHEMA_VERSION {
            return Err(SignerCodecError::UnsupportedVersion(version));
        }
        bincode::deserialize(body).map_err(|e| SignerCodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyshare::{GroupPublicKey, SecretShare};
    use tess_core::{KeepId, MemberId};

    fn signer() -> Signer {
        let members: Vec<MemberId> = (1u8..=3)
            .map(|b| MemberId::from_bytes(vec![b]).expect("member id"))
            .collect();
        let group = GroupInfo::new(
            KeepId::new("0xabc"),
            members[0].clone(),
            members,
            1,
        )
        .expect("group");
        Signer {
            group,
            share: KeyShare {
                party_index: 0,
                threshold: 1,
                public_key: GroupPublicKey {
                    x: [3; 32],
                    y: [4; 32],
                },
                secret_share: SecretShare::from_bytes([5; 32]),
            },
        }
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let original = signer();
        let bytes = original.to_bytes().expect("encode");
        let decoded = Signer::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, original);
        assert_eq!(decoded.to_bytes().expect("re-encode"), bytes);
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let mut bytes = signer().to_bytes().expect("encode");
        bytes[0] = 9;
        assert!(matches!(
            Signer::from_bytes(&bytes),
            Err(SignerCodecError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn rejects_empty_and_corrupt_data() {
        assert!(matches!(
            Signer::from_bytes(&[]),
            Err(SignerCodecError::Empty)
        ));
        let mut bytes = signer().to_bytes().expect("encode");
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            Signer::from_bytes(&bytes),
            Err(SignerCodecError::Decode(_))
        ));
    }
}
