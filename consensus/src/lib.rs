//! Synod Consensus Operator
//!
//! The consensus state machine running inside one committee member for
//! one contract instance. Per state index the operator:
//!
//! 1. collects validated requests into a backlog and gossips request
//!    notifications to the current leader,
//! 2. on the leader: selects a quorum-visible batch, orders peers to
//!    process it, runs the same VM task locally, collects signature
//!    shares over the result's essence hash, aggregates them, and
//!    submits the anchor transaction to the value ledger,
//! 3. on followers: validates the leader's order, runs the VM task, and
//!    returns a signature share,
//! 4. rotates the leader along a state-seeded permutation whenever the
//!    rotation deadline passes without progress.
//!
//! The engine is event-driven and single-threaded: all mutations happen
//! on one event context, and [`Operator::take_action`] re-evaluates the
//! protocol after every state change. I/O goes through the committee
//! network adapter, the ledger client, and the VM worker — none of it
//! blocks the event context.

pub mod backlog;
pub mod config;
pub mod error;
pub mod leader;
pub mod messages;
pub mod operator;

pub use {
    backlog::Backlog,
    config::ConsensusConfig,
    error::{ConsensusError, Result},
    leader::{leader_index, permutation},
    messages::{
        batch_hash, NotifyReqMsg, SignedHashMsg, StartProcessingBatchMsg, MSG_NOTIFY_REQUESTS,
        MSG_SIGNED_HASH, MSG_START_PROCESSING_BATCH,
    },
    operator::{Operator, OperatorEvent},
};
