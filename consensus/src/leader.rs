//! Leader selection.
//!
//! The leader schedule for state index `s` is
//! `permutation(state_hash(s))[(s + rotation_offset) mod N]`: the
//! hash-seeded committee permutation indexed by the state index plus a
//! rotation offset. The offset is a monotone counter advanced only when
//! a rotation deadline passes and reset to zero on every state
//! transition, so honest nodes that observe the same timeouts agree on
//! the leader at every point.

pub use synod_types::permutation;

/// The leader for `state_index` given the state's permutation and the
/// current rotation offset.
pub fn leader_index(permutation: &[u16], state_index: u32, rotation_offset: u32) -> u16 {
    let n = permutation.len() as u64;
    permutation[((state_index as u64 + rotation_offset as u64) % n) as usize]
}

#[cfg(test)]
mod tests {
    use {super::*, synod_types::hash_data};

    #[test]
    fn test_rotation_advances_leader() {
        let order = permutation(4, &hash_data(b"seed"));
        let l0 = leader_index(&order, 5, 0);
        let l1 = leader_index(&order, 5, 1);
        assert_ne!(l0, l1);
        // wraps around the committee
        assert_eq!(leader_index(&order, 5, 4), l0);
    }

    #[test]
    fn test_leader_changes_with_state_index() {
        let order = permutation(4, &hash_data(b"seed"));
        assert_eq!(leader_index(&order, 0, 1), leader_index(&order, 1, 0));
    }

    #[test]
    fn test_single_member_committee() {
        let order = permutation(1, &hash_data(b"seed"));
        for offset in 0..5 {
            assert_eq!(leader_index(&order, 9, offset), 0);
        }
    }
}
