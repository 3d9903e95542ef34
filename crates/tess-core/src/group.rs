//! Group descriptor for one keep instance.

use crate::identifiers::{KeepId, MemberId};
use serde::{Deserialize, Serialize};

/// Errors produced when validating a [`GroupInfo`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    /// The member list was empty.
    #[error("group has no members")]
    NoMembers,
    /// The dishonest threshold does not leave an honest majority capable of
    /// signing: `members.len()` must exceed it.
    #[error("group of {members} members cannot tolerate {threshold} dishonest members")]
    ThresholdTooLarge {
        /// Number of group members.
        members: usize,
        /// Requested dishonest threshold.
        threshold: usize,
    },
    /// The local operator is not part of the member list.
    #[error("member {member} does not belong to group {group}")]
    NotAMember {
        /// The local member id.
        member: MemberId,
        /// The group's keep id.
        group: KeepId,
    },
    /// Two members share an identifier.
    #[error("duplicate member id {member} in group {group}")]
    DuplicateMember {
        /// The duplicated member id.
        member: MemberId,
        /// The group's keep id.
        group: KeepId,
    },
}

/// Descriptor of one keep's signing group.
///
/// Members are held in canonical ascending order; the cryptographic layer
/// relies on every participant observing the same ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    keep_id: KeepId,
    this_member: MemberId,
    members: Vec<MemberId>,
    dishonest_threshold: usize,
}

impl GroupInfo {
    /// Build and validate a group descriptor.
    ///
    /// The member list may arrive in any order; it is sorted canonically
    /// here. Any `dishonest_threshold + 1` members can produce a signature,
    /// so the group must be strictly larger than the threshold.
    pub fn new(
        keep_id: KeepId,
        this_member: MemberId,
        mut members: Vec<MemberId>,
        dishonest_threshold: usize,
    ) -> Result<Self, GroupError> {
        if members.is_empty() {
            return Err(GroupError::NoMembers);
        }
        if dishonest_threshold >= members.len() {
            return Err(GroupError::ThresholdTooLarge {
                members: members.len(),
                threshold: dishonest_threshold,
            });
        }
        members.sort();
        if let Some(pair) = members.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(GroupError::DuplicateMember {
                member: pair[0].clone(),
                group: keep_id,
            });
        }
        if !members.contains(&this_member) {
            return Err(GroupError::NotAMember {
                member: this_member,
                group: keep_id,
            });
        }
        Ok(Self {
            keep_id,
            this_member,
            members,
            dishonest_threshold,
        })
    }

    /// The keep this group belongs to.
    pub fn keep_id(&self) -> &KeepId {
        &self.keep_id
    }

    /// The local operator's member id.
    pub fn this_member(&self) -> &MemberId {
        &self.this_member
    }

    /// All members in canonical ascending order.
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    /// Members other than the local operator, in canonical order.
    pub fn other_members(&self) -> impl Iterator<Item = &MemberId> {
        self.members.iter().filter(move |m| **m != self.this_member)
    }

    /// Maximum number of dishonest members the group tolerates.
    pub fn dishonest_threshold(&self) -> usize {
        self.dishonest_threshold
    }

    /// Position of a member in the canonical ordering.
    pub fn member_index(&self, member: &MemberId) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    /// Position of the local operator in the canonical ordering.
    pub fn this_member_index(&self) -> usize {
        self.member_index(&self.this_member)
            .unwrap_or_default() // membership is checked at construction
    }

    /// Whether the given member belongs to the group.
    pub fn is_member(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(byte: u8) -> MemberId {
        MemberId::from_bytes(vec![byte]).expect("member id")
    }

    fn keep() -> KeepId {
        KeepId::new("0x0101")
    }

    #[test]
    fn members_are_sorted_canonically() {
        let group = GroupInfo::new(
            keep(),
            member(2),
            vec![member(3), member(1), member(2)],
            1,
        )
        .expect("group");
        assert_eq!(group.members(), &[member(1), member(2), member(3)]);
        assert_eq!(group.this_member_index(), 1);
    }

    #[test]
    fn rejects_threshold_not_below_member_count() {
        let err = GroupInfo::new(keep(), member(1), vec![member(1), member(2)], 2)
            .expect_err("threshold too large");
        assert!(matches!(err, GroupError::ThresholdTooLarge { .. }));
    }

    #[test]
    fn rejects_non_member_operator() {
        let err = GroupInfo::new(keep(), member(9), vec![member(1), member(2)], 1)
            .expect_err("not a member");
        assert!(matches!(err, GroupError::NotAMember { .. }));
    }

    #[test]
    fn rejects_duplicate_members() {
        let err = GroupInfo::new(
            keep(),
            member(1),
            vec![member(1), member(2), member(2)],
            1,
        )
        .expect_err("duplicate");
        assert!(matches!(err, GroupError::DuplicateMember { .. }));
    }

    #[test]
    fn other_members_excludes_self() {
        let group = GroupInfo::new(
            keep(),
            member(2),
            vec![member(1), member(2), member(3)],
            1,
        )
        .expect("group");
        let others: Vec<_> = group.other_members().cloned().collect();
        assert_eq!(others, vec![member(1), member(3)]);
    }
}
