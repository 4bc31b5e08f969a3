//! Property-based tests for consensus invariants.
//!
//! Properties tested:
//! 1. The leader schedule is a function of (committee size, state hash,
//!    state index, rotation offset) alone — every node computes the same
//!    leader.
//! 2. The state-seeded permutation is a permutation.
//! 3. The batch hash is independent of request-id input order.
//! 4. Request selection never exceeds its cap and respects the
//!    notification quorum.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        synod_consensus::{batch_hash, leader_index, permutation, Backlog},
        synod_ledger::RequestBlock,
        synod_types::{hash_data, HashValue, RequestId},
    };

    proptest! {
        #[test]
        fn leader_schedule_agrees_across_nodes(
            size in 1u16..32,
            seed in any::<[u8; 32]>(),
            state_index in any::<u32>(),
            rotation_offset in 0u32..1_000,
        ) {
            let seed = HashValue::new(seed);
            // two independent computations, as two honest nodes would run
            let a = leader_index(&permutation(size, &seed), state_index, rotation_offset);
            let b = leader_index(&permutation(size, &seed), state_index, rotation_offset);
            prop_assert_eq!(a, b);
            prop_assert!(a < size);
        }

        #[test]
        fn permutation_is_a_permutation(size in 1u16..64, seed in any::<[u8; 32]>()) {
            let mut order = permutation(size, &HashValue::new(seed));
            order.sort_unstable();
            prop_assert_eq!(order, (0..size).collect::<Vec<u16>>());
        }

        #[test]
        fn rotation_walks_the_whole_committee(size in 1u16..16, seed in any::<[u8; 32]>()) {
            let order = permutation(size, &HashValue::new(seed));
            let mut seen: Vec<u16> = (0..size as u32)
                .map(|offset| leader_index(&order, 5, offset))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), size as usize);
        }

        #[test]
        fn batch_hash_is_order_independent(
            tags in proptest::collection::vec(any::<u8>(), 1..20),
            timestamp in any::<i64>(),
        ) {
            let ids: Vec<RequestId> = tags
                .iter()
                .map(|t| RequestId::new(hash_data(&[*t]), 0))
                .collect();
            let mut reversed = ids.clone();
            reversed.reverse();
            prop_assert_eq!(batch_hash(&ids, timestamp), batch_hash(&reversed, timestamp));
        }

        #[test]
        fn selection_respects_cap_and_quorum(
            count in 0usize..50,
            notified in 0usize..8,
            quorum in 0usize..8,
            cap in 1usize..20,
        ) {
            let mut backlog = Backlog::new();
            for tag in 0..count {
                let id = RequestId::new(hash_data(&[tag as u8]), 0);
                backlog.insert(id, RequestBlock::default(), tag as i64);
                for peer in 0..notified {
                    backlog.mark_notified(peer as u16, &[id]);
                }
            }
            let selected = backlog.select_ready(quorum, cap);
            prop_assert!(selected.len() <= cap);
            if notified < quorum {
                prop_assert!(selected.is_empty());
            } else {
                prop_assert_eq!(selected.len(), count.min(cap));
            }
        }
    }
}
