//! The VM task boundary.

use {
    crate::error::{Result, VmError},
    synod_ledger::{AnchorTransaction, Balances, RequestBlock},
    synod_state::{Batch, StateUpdate, VirtualState},
    synod_types::{Address, Color, HashValue, RequestId},
};

/// Everything a deterministic VM run may depend on. No wall clock, no I/O.
#[derive(Debug, Clone)]
pub struct VmTaskInput {
    /// Contract address.
    pub address: Address,
    /// Committee token color.
    pub color: Color,
    /// Program to execute.
    pub program_hash: HashValue,
    /// Value snapshot of the state the batch builds on.
    pub state: VirtualState,
    /// Requests to process, in batch order.
    pub requests: Vec<(RequestId, RequestBlock)>,
    /// Batch timestamp chosen by the leader.
    pub timestamp: i64,
    /// Ledger balances backing the contract address.
    pub balances: Balances,
    /// Address collecting request rewards.
    pub reward_address: Address,
    /// Committee index of the leader that ordered this batch.
    pub leader_peer_index: u16,
}

/// The result of one VM run.
#[derive(Debug, Clone)]
pub struct VmTaskOutput {
    /// The produced batch, sealed with the anchor's essence hash.
    pub batch: Batch,
    /// Essence hash of the anchor draft — the object committee members sign.
    pub essence_hash: HashValue,
    /// The unsigned anchor transaction for the new state.
    pub anchor_draft: AnchorTransaction,
    /// Messages the program published during the run. The operator
    /// forwards them to the telemetry bus as `vmmsg` events after the
    /// task completes, keeping the run itself side-effect free.
    pub messages: Vec<String>,
}

/// A finished task, posted back to the operator's inbox.
#[derive(Debug)]
pub struct VmCompletion {
    /// Leader index the task ran for (own index when we are the leader).
    pub leader_peer_index: u16,
    /// Program that ran.
    pub program_hash: HashValue,
    /// The output, or the task error.
    pub result: Result<VmTaskOutput>,
}

/// Seal a run's updates into `(batch, essence, anchor draft)`.
///
/// Computes the post-state hash by applying the batch to a copy of the
/// input state, builds the anchor draft over it, and stamps the batch
/// with the draft's essence hash. Shared by every [`Processor`]
/// implementation so outputs stay byte-identical across nodes.
///
/// [`Processor`]: crate::processor::Processor
pub fn seal_output(input: &VmTaskInput, updates: Vec<StateUpdate>) -> Result<VmTaskOutput> {
    let mut batch = Batch {
        state_index: input.state.state_index + 1,
        timestamp: input.timestamp,
        essence_hash: HashValue::nil(),
        updates,
    };

    let mut preview = input.state.clone();
    preview
        .apply(&batch)
        .map_err(|e| VmError::BadInput(e.to_string()))?;

    let anchor_draft = AnchorTransaction::draft(
        input.address,
        input.color,
        batch.state_index,
        preview.hash(),
        input.timestamp,
    );
    let essence_hash = anchor_draft.essence_hash();
    batch.essence_hash = essence_hash;

    Ok(VmTaskOutput {
        batch,
        essence_hash,
        anchor_draft,
        messages: Vec::new(),
    })
}
