//! Synod Property-Based Invariant Tests
//!
//! Uses proptest to verify critical system invariants across:
//! - Transport framing and chunk reassembly
//! - Leader schedule agreement
//! - State hash convergence and backlog hygiene

pub mod consensus_invariants;
pub mod peering_invariants;
pub mod state_invariants;
