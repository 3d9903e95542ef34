//! Transport peer identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use tess_core::{MemberId, MemberIdError};

/// Transport-level identity of one node: its long-term network public key.
///
/// The same key bytes derive the node's [`MemberId`], so a claimed party id
/// inside a payload can be checked against the authenticated transport
/// sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Build a peer id from public key bytes.
    pub fn from_public_key(public_key: impl Into<Vec<u8>>) -> Self {
        Self(public_key.into())
    }

    /// The public key bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.0
    }

    /// The member id bound to this transport identity.
    pub fn member_id(&self) -> Result<MemberId, MemberIdError> {
        MemberId::from_public_key(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_and_member_share_key_bytes() {
        let peer = PeerId::from_public_key(vec![1, 2, 3]);
        let member = peer.member_id().expect("member id");
        assert_eq!(member.as_bytes(), peer.public_key());
    }
}
