//! Synod Ledger Interface
//!
//! The committee anchors its state on an external value-transfer ledger.
//! This crate fixes the contract the node relies on — [`LedgerClient`] —
//! and the transaction shapes that cross it:
//!
//! - [`AnchorTransaction`] — a ledger transaction whose output encodes the
//!   committee's new state hash. Confirming one commits a batch. The same
//!   shape carries inbound request blocks addressed to the contract.
//! - [`Balances`] — the colored-token balances backing the contract
//!   address, refreshed on demand by the operator.
//!
//! [`MemLedger`] is an in-process implementation used by tests and local
//! clusters: submitted anchors confirm immediately and fan out to every
//! subscriber, which is exactly the behavior the consensus scenarios need.

pub mod error;
pub mod memledger;
pub mod transaction;

pub use {
    error::{LedgerError, Result},
    memledger::MemLedger,
    transaction::{AnchorTransaction, Balances, RequestBlock},
};

use {crossbeam_channel::Receiver, synod_types::Address};

/// Events delivered on a ledger subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// A transaction involving the subscribed address was confirmed.
    Confirmed(AnchorTransaction),
    /// Reply to a balance request.
    Balances(Balances),
}

/// The ledger-node client contract.
///
/// Implementations deliver events asynchronously on the subscription
/// channel; `request_balances` replies there too rather than returning
/// the balances inline.
pub trait LedgerClient: Send + Sync {
    /// Subscribe to confirmed transactions and balance replies for `address`.
    fn subscribe(&self, address: &Address) -> Receiver<LedgerEvent>;

    /// Ask for the current balances of `address`. The reply arrives as
    /// [`LedgerEvent::Balances`] on the subscription.
    fn request_balances(&self, address: &Address) -> Result<()>;

    /// Submit a finalized anchor transaction.
    fn submit(&self, tx: AnchorTransaction) -> Result<()>;
}
