//! Synod Committee Node Core
//!
//! Ties the subsystems into one running committee node:
//!
//! - boots the peering stack on its own tokio runtime,
//! - runs the consensus operator and the state manager on dedicated
//!   threads, each draining a single event inbox (all mutations of
//!   either machine happen on its own context, FIFO),
//! - routes decoded peer messages, ledger confirmations, and balance
//!   replies to the right inbox,
//! - fans a periodic timer tick out to both machines,
//! - tears everything down on dismissal.

pub mod dispatch;
pub mod error;
pub mod node;

pub use {
    error::{CoreError, Result},
    node::{CommitteeNode, NodeConfig},
};
