//! Synod State Layer
//!
//! The replicated contract state and the machinery that keeps it in sync:
//!
//! - [`VirtualState`] — the versioned variable snapshot, starting from the
//!   deterministic origin state built out of the committee descriptor.
//! - [`Batch`] / [`StateUpdate`] — the per-round unit of change: one
//!   ordered update per processed request, sealed by an anchor
//!   transaction's essence hash.
//! - [`StateManager`] — the event machine that reassembles batches from
//!   peers, serves batch requests, commits batches when their anchor
//!   confirms on the ledger, and catches up after restarts or partitions.
//!
//! The manager owns the virtual state exclusively. Everything downstream
//! (the consensus operator) sees it only as the value snapshot carried by
//! a [`StateTransition`].

pub mod batch;
pub mod config;
pub mod error;
pub mod manager;
pub mod messages;
pub mod state;
pub mod sync;

pub use {
    batch::{Batch, StateUpdate},
    config::StateConfig,
    error::{Result, StateError},
    manager::{StateEvent, StateManager, StateTransition},
    messages::{
        BatchHeaderMsg, EvidenceMsg, GetBatchMsg, StateUpdateMsg, MSG_BATCH_HEADER,
        MSG_GET_BATCH, MSG_STATE_INDEX_EVIDENCE, MSG_STATE_UPDATE,
    },
    state::{VirtualState, VAR_COMMITTEE_SIZE, VAR_OWNER_ADDRESS, VAR_PROGRAM_HASH},
};
