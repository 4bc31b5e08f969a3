//! Property-based tests for state invariants.
//!
//! Properties tested:
//! 1. Two nodes applying the same batch sequence to the same origin end
//!    with identical state hashes.
//! 2. A batch that does not chain onto the current index is rejected and
//!    leaves the state untouched.
//! 3. The persisted encoding round-trips, hash included.
//! 4. The committee descriptor encoding round-trips.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        synod_registry::BootupData,
        synod_state::{Batch, StateUpdate, VirtualState},
        synod_types::{hash_data, Address, Color, HashValue, RequestId},
    };

    fn bootup() -> BootupData {
        BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec!["a:1".into(), "b:2".into(), "c:3".into(), "d:4".into()],
            access_nodes: vec![],
        }
    }

    /// An arbitrary batch for the given state index out of small keys
    /// and values.
    fn batch_strategy(state_index: u32) -> impl Strategy<Value = Batch> {
        proptest::collection::vec(
            (
                any::<u8>(),
                proptest::collection::vec(("[a-d]{1,4}", proptest::collection::vec(any::<u8>(), 0..8)), 0..4),
            ),
            0..4,
        )
        .prop_map(move |updates| Batch {
            state_index,
            timestamp: state_index as i64 * 1_000 + 1,
            essence_hash: hash_data(&state_index.to_be_bytes()),
            updates: updates
                .into_iter()
                .map(|(tag, mutations)| {
                    let mut update = StateUpdate::new(RequestId::new(hash_data(&[tag]), 0));
                    for (key, value) in mutations {
                        update.set(&key, value);
                    }
                    update
                })
                .collect(),
        })
    }

    /// A batch for `state_index` derived entirely from `seed`.
    fn seeded_batch(state_index: u32, seed: u8) -> Batch {
        let mut update = StateUpdate::new(RequestId::new(hash_data(&[seed]), 0));
        update.set(&format!("k{}", seed % 7), vec![seed, seed.wrapping_mul(3)]);
        if seed % 3 == 0 {
            update.set("shared", vec![seed]);
        }
        Batch {
            state_index,
            timestamp: state_index as i64 * 1_000 + 1,
            essence_hash: hash_data(&[seed, 0xee]),
            updates: vec![update],
        }
    }

    proptest! {
        #[test]
        fn same_batches_same_hash(seeds in proptest::collection::vec(any::<u8>(), 1..6)) {
            let batches: Vec<Batch> = seeds
                .iter()
                .enumerate()
                .map(|(i, seed)| seeded_batch(i as u32 + 1, *seed))
                .collect();

            let mut a = VirtualState::origin(&bootup());
            let mut b = VirtualState::origin(&bootup());
            for batch in &batches {
                a.apply(batch).unwrap();
                b.apply(batch).unwrap();
                prop_assert_eq!(a.hash(), b.hash());
            }
            prop_assert_eq!(a.state_index, batches.len() as u32);
        }

        #[test]
        fn out_of_sequence_batch_rejected(gap in 2u32..100, batch in batch_strategy(1)) {
            let mut state = VirtualState::origin(&bootup());
            let before = state.hash();

            let mut wrong = batch;
            wrong.state_index = gap;
            prop_assert!(state.apply(&wrong).is_err());
            prop_assert_eq!(state.hash(), before);
            prop_assert_eq!(state.state_index, 0);
        }

        #[test]
        fn state_encoding_roundtrips(batch in batch_strategy(1)) {
            let mut state = VirtualState::origin(&bootup());
            state.apply(&batch).unwrap();

            let decoded = VirtualState::decode(&state.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.hash(), state.hash());
            prop_assert_eq!(decoded, state);
        }

        #[test]
        fn batch_encoding_roundtrips(batch in batch_strategy(3)) {
            let decoded = Batch::decode(&batch.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded.updates_digest(), batch.updates_digest());
            prop_assert_eq!(decoded, batch);
        }

        #[test]
        fn bootup_encoding_roundtrips(
            committee in proptest::collection::vec("[a-z]{1,8}:[0-9]{1,5}", 1..8),
            access in proptest::collection::vec("[a-z]{1,8}:[0-9]{1,5}", 0..4),
            color_byte in 1u8..255,
        ) {
            let bd = BootupData {
                address: Address::new([5u8; 20]),
                owner_address: Address::new([6u8; 20]),
                color: Color::new([color_byte; 32]),
                committee_nodes: committee,
                access_nodes: access,
            };
            let decoded = BootupData::decode(&bd.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, bd);
        }

        #[test]
        fn updates_digest_detects_tampering(batch in batch_strategy(1)) {
            prop_assume!(!batch.updates.is_empty());
            let digest = batch.updates_digest();

            let mut tampered = batch;
            tampered.updates[0]
                .mutations
                .push(("tamper".to_string(), vec![1]));
            prop_assert_ne!(tampered.updates_digest(), digest);
        }
    }

    #[test]
    fn origin_hash_is_stable_across_nodes() {
        let hashes: Vec<HashValue> = (0..4)
            .map(|_| VirtualState::origin(&bootup()).hash())
            .collect();
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    }
}
