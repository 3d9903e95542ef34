//! Property tests for identifier and group laws.
#![allow(missing_docs)]

use proptest::prelude::*;
use tess_core::{GroupInfo, KeepId, MemberId};

fn big_endian_value(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
}

proptest! {
    #[test]
    fn member_id_construction_accepts_exactly_positive_integers(bytes in proptest::collection::vec(any::<u8>(), 0..8)) {
        let expect_ok = !bytes.is_empty() && bytes.iter().any(|&b| b != 0);
        prop_assert_eq!(MemberId::from_bytes(bytes).is_ok(), expect_ok);
    }

    #[test]
    fn member_id_ordering_matches_numeric_ordering(
        a in proptest::collection::vec(any::<u8>(), 1..8),
        b in proptest::collection::vec(any::<u8>(), 1..8),
    ) {
        prop_assume!(a.iter().any(|&x| x != 0) && b.iter().any(|&x| x != 0));
        let (va, vb) = (big_endian_value(&a), big_endian_value(&b));
        let (ma, mb) = (
            MemberId::from_bytes(a).expect("id"),
            MemberId::from_bytes(b).expect("id"),
        );
        if va != vb {
            prop_assert_eq!(va.cmp(&vb), ma.cmp(&mb));
        }
    }

    #[test]
    fn groups_with_too_large_thresholds_are_rejected(
        size in 1usize..6,
        extra in 0usize..4,
    ) {
        let members: Vec<MemberId> = (1..=size as u8)
            .map(|b| MemberId::from_bytes(vec![b]).expect("id"))
            .collect();
        let result = GroupInfo::new(
            KeepId::new("0x01"),
            members[0].clone(),
            members,
            size + extra,
        );
        prop_assert!(result.is_err());
    }

    #[test]
    fn group_sorting_is_order_independent(seed in any::<u64>()) {
        let mut members: Vec<MemberId> = (1u8..=5)
            .map(|b| MemberId::from_bytes(vec![b]).expect("id"))
            .collect();
        // Pseudo-shuffle from the seed.
        let len = members.len();
        for i in 0..len {
            let j = (seed as usize + i * 7) % len;
            members.swap(i, j);
        }
        let group = GroupInfo::new(
            KeepId::new("0x01"),
            members[0].clone(),
            members,
            2,
        )
        .expect("group");
        let sorted: Vec<_> = group.members().to_vec();
        let mut expected = sorted.clone();
        expected.sort();
        prop_assert_eq!(sorted, expected);
    }
}
