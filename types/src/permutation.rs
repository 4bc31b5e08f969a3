//! Hash-seeded committee permutations.
//!
//! Several subsystems walk the committee in an order every honest node
//! can reproduce: leader selection indexes into it, catch-up spreads its
//! batch requests along it. The order is a Fisher-Yates shuffle seeded
//! by a state hash, so it changes per state but never per node.

use {
    crate::hash::HashValue,
    rand::seq::SliceRandom,
    rand_chacha::{rand_core::SeedableRng, ChaCha20Rng},
};

/// The committee permutation for one state, seeded by its hash.
pub fn permutation(size: u16, seed: &HashValue) -> Vec<u16> {
    let mut order: Vec<u16> = (0..size).collect();
    let mut rng = ChaCha20Rng::from_seed(seed.to_bytes());
    order.shuffle(&mut rng);
    order
}
