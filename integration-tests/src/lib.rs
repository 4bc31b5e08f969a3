//! Synod Integration Tests
//!
//! In-process multi-node scenarios for the committee node:
//!
//! 1. **Transport** — a full committee connects pairwise, one connection
//!    per peer pair, with traffic flowing both ways
//! 2. **Consensus** — request to anchored batch: notification gossip,
//!    leader proposal, quorum aggregation, state commit on confirmation
//! 3. **Leader rotation** — the committee keeps committing when the
//!    scheduled leader is down
//! 4. **Catch-up** — a restarted node fetches missed batches (including
//!    oversize ones that travel chunked) and reaches the committee's tip
//!
//! The harness wires real nodes over loopback TCP with the in-memory
//! ledger and key-value store and the built-in echo processor.

pub mod harness;


#[cfg(test)]
mod consensus_tests;
