//! The state manager: reconciling state-transition evidence.
//!
//! All mutations happen on a single event context — the committee node
//! feeds one [`StateEvent`] at a time from the manager's inbox. The
//! manager:
//!
//! - tracks the largest state index evidenced by peers and catches up
//!   when it falls behind,
//! - reassembles batches announced by peers (header + updates) and
//!   serves its own committed batches on request,
//! - holds pending batches until the ledger confirms their anchor
//!   transaction, then commits: applies the batch to the virtual state,
//!   persists both, and emits a [`StateTransition`] to the operator.
//!
//! Commit invariant: a batch is applied only when its anchor is
//! confirmed, so the persisted state is never ahead of the ledger.

use {
    crate::{
        batch::Batch,
        config::StateConfig,
        error::{Result, StateError},
        messages::{
            BatchHeaderMsg, EvidenceMsg, GetBatchMsg, StateUpdateMsg, MSG_BATCH_HEADER,
            MSG_STATE_INDEX_EVIDENCE, MSG_STATE_UPDATE,
        },
        state::VirtualState,
        sync::CatchUp,
    },
    crossbeam_channel::Sender,
    log::{debug, error, info, warn},
    serde::{Deserialize, Serialize},
    std::{
        collections::HashMap,
        sync::Arc,
        time::Instant,
    },
    synod_ledger::AnchorTransaction,
    synod_monitoring::SynodMetrics,
    synod_peering::CommitteeNet,
    synod_registry::{batch_key, state_key, BootupData, KvStore},
    synod_types::permutation,
};

/// Events processed by the state manager.
#[derive(Debug)]
pub enum StateEvent {
    /// A peer claims to have committed `state_index`.
    EvidenceStateIndex { sender_index: u16, state_index: u32 },
    /// A peer asks for one of our committed batches.
    GetBatch { sender_index: u16, msg: GetBatchMsg },
    /// A batch transfer begins.
    BatchHeader(BatchHeaderMsg),
    /// One update of an announced batch.
    StateUpdate(StateUpdateMsg),
    /// The ledger confirmed a transaction for our address.
    StateTransaction(AnchorTransaction),
    /// The local VM produced a batch for the next state index.
    PendingBatch(Batch),
    /// Periodic tick from the node's timer.
    TimerTick(u64),
}

/// Read-only view handed to the operator on every commit.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Value snapshot of the new state.
    pub state: VirtualState,
    /// The anchor that committed it; `None` only for the initial
    /// announcement of a freshly loaded state.
    pub anchor: Option<AnchorTransaction>,
    /// Requests whose effects are in the committed batch; the operator
    /// prunes them from its backlog.
    pub committed_requests: Vec<synod_types::RequestId>,
    /// True iff no peer has evidenced a higher index.
    pub synchronized: bool,
}

/// Persisted record of a committed batch together with its anchor, so
/// catch-up can serve both in one transfer.
#[derive(Serialize, Deserialize)]
struct StoredBatch {
    batch: Batch,
    anchor: AnchorTransaction,
}

struct PartialBatch {
    header: BatchHeaderMsg,
    updates: Vec<Option<crate::batch::StateUpdate>>,
    received: u16,
    started_at: Instant,
}

/// See the module doc.
pub struct StateManager {
    config: StateConfig,
    store: Arc<dyn KvStore>,
    net: Arc<CommitteeNet>,
    metrics: Arc<SynodMetrics>,
    transitions: Sender<StateTransition>,

    current: VirtualState,
    last_anchor: Option<AnchorTransaction>,
    /// Batches waiting for their anchor, keyed by state index.
    pending: HashMap<u32, Batch>,
    /// Confirmed anchors ahead of the current state.
    anchors: HashMap<u32, AnchorTransaction>,
    /// Batch transfers mid-reassembly, keyed by state index.
    incoming: HashMap<u32, PartialBatch>,
    largest_evidenced: u32,
    syncer: CatchUp,
    last_evidence_broadcast: Instant,
    halted: bool,
}

impl StateManager {
    /// Load the persisted state for the committee, or build and persist
    /// the origin state. Boot errors surface to the caller.
    pub fn new(
        config: StateConfig,
        bootup: &BootupData,
        store: Arc<dyn KvStore>,
        net: Arc<CommitteeNet>,
        metrics: Arc<SynodMetrics>,
        transitions: Sender<StateTransition>,
    ) -> Result<Self> {
        let current = match store.get(&state_key(&bootup.address))? {
            Some(bytes) => {
                let state = VirtualState::decode(&bytes)?;
                info!(
                    "loaded virtual state #{} for {}",
                    state.state_index, state.address
                );
                state
            }
            None => {
                let origin = VirtualState::origin(bootup);
                store.set(&state_key(&bootup.address), &origin.encode()?)?;
                info!("created origin state for {}", origin.address);
                origin
            }
        };
        metrics.state_index.set(current.state_index as i64);

        Ok(Self {
            config,
            store,
            net,
            metrics,
            transitions,
            largest_evidenced: current.state_index,
            current,
            last_anchor: None,
            pending: HashMap::new(),
            anchors: HashMap::new(),
            incoming: HashMap::new(),
            syncer: CatchUp::new(),
            last_evidence_broadcast: Instant::now(),
            halted: false,
        })
    }

    /// The current virtual state.
    pub fn state(&self) -> &VirtualState {
        &self.current
    }

    /// True iff no peer has evidenced a higher state index.
    pub fn is_synchronized(&self) -> bool {
        self.current.state_index >= self.largest_evidenced
    }

    /// Emit the current state to the operator. Called once after boot so
    /// consensus starts from the loaded state.
    pub fn announce_current(&self) {
        let _ = self.transitions.send(StateTransition {
            state: self.current.clone(),
            anchor: self.last_anchor.clone(),
            committed_requests: Vec::new(),
            synchronized: self.is_synchronized(),
        });
    }

    /// Process one event. Never propagates errors; a fatal invariant
    /// violation halts this manager without crashing the process.
    pub fn handle_event(&mut self, event: StateEvent) {
        if self.halted {
            return;
        }
        match event {
            StateEvent::EvidenceStateIndex {
                sender_index,
                state_index,
            } => self.on_evidence(sender_index, state_index),
            StateEvent::GetBatch { sender_index, msg } => self.on_get_batch(sender_index, msg),
            StateEvent::BatchHeader(msg) => self.on_batch_header(msg),
            StateEvent::StateUpdate(msg) => self.on_state_update(msg),
            StateEvent::StateTransaction(tx) => self.on_state_transaction(tx),
            StateEvent::PendingBatch(batch) => self.on_pending_batch(batch),
            StateEvent::TimerTick(tick) => self.on_timer_tick(tick),
        }
    }

    // ── Event handlers ──────────────────────────────────────────────────

    fn on_evidence(&mut self, sender_index: u16, state_index: u32) {
        if state_index > self.largest_evidenced {
            debug!(
                "peer {sender_index} evidences state index {state_index} (local {})",
                self.current.state_index
            );
            self.largest_evidenced = state_index;
        }
    }

    fn on_get_batch(&mut self, sender_index: u16, msg: GetBatchMsg) {
        if msg.state_index > self.current.state_index {
            // not committed here yet
            return;
        }
        let key = batch_key(&self.current.address, msg.state_index);
        let stored = match self.store.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no stored batch for requested index {}", msg.state_index);
                return;
            }
            Err(e) => {
                warn!("store read failed serving batch {}: {e}", msg.state_index);
                return;
            }
        };
        let record: StoredBatch = match bincode::deserialize(&stored) {
            Ok(record) => record,
            Err(e) => {
                warn!("corrupted stored batch {}: {e}", msg.state_index);
                return;
            }
        };
        self.send_batch(sender_index, &record.batch, Some(record.anchor));
    }

    fn on_batch_header(&mut self, msg: BatchHeaderMsg) {
        if msg.state_index <= self.current.state_index {
            return;
        }
        if let Some(anchor) = &msg.anchor {
            self.record_anchor(anchor.clone());
        }
        let size = msg.size as usize;
        let state_index = msg.state_index;
        let partial = PartialBatch {
            updates: vec![None; size],
            received: 0,
            started_at: Instant::now(),
            header: msg,
        };
        if size == 0 {
            self.finish_reassembly(partial);
        } else {
            self.incoming.insert(state_index, partial);
        }
        self.try_commit();
    }

    fn on_state_update(&mut self, msg: StateUpdateMsg) {
        let Some(partial) = self.incoming.get_mut(&msg.state_index) else {
            // no open transfer for this index
            return;
        };
        let seq = msg.seq as usize;
        if seq >= partial.updates.len() {
            warn!(
                "update seq {seq} out of range for batch {} (size {})",
                msg.state_index,
                partial.updates.len()
            );
            self.incoming.remove(&msg.state_index);
            return;
        }
        if partial.updates[seq].is_none() {
            partial.updates[seq] = Some(msg.update);
            partial.received += 1;
        }
        if partial.received as usize == partial.updates.len() {
            let partial = self
                .incoming
                .remove(&msg.state_index)
                .expect("partial present");
            self.finish_reassembly(partial);
            self.try_commit();
        }
    }

    fn on_state_transaction(&mut self, tx: AnchorTransaction) {
        if tx.state_index <= self.current.state_index {
            return;
        }
        debug!(
            "anchor confirmed for state index {} (essence {})",
            tx.state_index,
            tx.essence_hash().short()
        );
        self.record_anchor(tx);
        self.try_commit();
    }

    fn on_pending_batch(&mut self, batch: Batch) {
        if batch.state_index != self.current.state_index + 1 {
            debug!(
                "pending batch for index {} out of context (local {})",
                batch.state_index, self.current.state_index
            );
            return;
        }
        self.send_batch_to_all(&batch);
        self.pending.insert(batch.state_index, batch);
        self.try_commit();
    }

    fn on_timer_tick(&mut self, _tick: u64) {
        // re-announce our state index so lagging peers find the tip
        if self.last_evidence_broadcast.elapsed() >= self.config.evidence_period {
            self.broadcast_evidence();
        }

        // discard stale partial transfers; catch-up will re-request
        let timeout = self.config.reassembly_timeout;
        self.incoming.retain(|state_index, partial| {
            let keep = partial.started_at.elapsed() < timeout;
            if !keep {
                warn!("reassembly of batch {state_index} timed out, discarding");
            }
            keep
        });

        // drive catch-up, spreading requests along the state-seeded
        // committee permutation
        let target = self.catchup_target();
        if target > self.current.state_index {
            let sequence = permutation(self.net.size(), &self.current.hash());
            let pending = &self.pending;
            let current = self.current.state_index;
            self.syncer.tick(
                &self.net,
                &sequence,
                current,
                target,
                |idx| pending.contains_key(&idx),
                self.config.catchup_retry,
                &self.metrics,
            );
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn record_anchor(&mut self, tx: AnchorTransaction) {
        if tx.state_index > self.largest_evidenced {
            self.largest_evidenced = tx.state_index;
        }
        self.anchors.entry(tx.state_index).or_insert(tx);
    }

    /// The highest index worth fetching. A gap of more than one behind
    /// the evidence always engages catch-up; a confirmed anchor for the
    /// very next index does too, since its batch provably exists.
    fn catchup_target(&self) -> u32 {
        let next = self.current.state_index + 1;
        if self.largest_evidenced > next {
            self.largest_evidenced
        } else if self.anchors.contains_key(&next) && !self.pending.contains_key(&next) {
            next
        } else {
            self.current.state_index
        }
    }

    fn finish_reassembly(&mut self, partial: PartialBatch) {
        let updates: Vec<_> = partial
            .updates
            .into_iter()
            .map(|u| u.expect("all updates present"))
            .collect();
        let batch = Batch {
            state_index: partial.header.state_index,
            timestamp: partial.header.timestamp,
            essence_hash: partial.header.essence_hash,
            updates,
        };
        if batch.updates_digest() != partial.header.updates_digest {
            warn!(
                "reassembled batch {} fails its digest check, discarding",
                batch.state_index
            );
            return;
        }
        debug!(
            "reassembled batch {} ({} updates)",
            batch.state_index,
            batch.size()
        );
        self.syncer.complete(batch.state_index);
        self.pending.insert(batch.state_index, batch);
    }

    /// Commit every consecutive `(batch, anchor)` pair starting at the
    /// next index.
    fn try_commit(&mut self) {
        loop {
            let next = self.current.state_index + 1;
            let Some(anchor) = self.anchors.get(&next) else {
                return;
            };
            let Some(batch) = self.pending.get(&next) else {
                return;
            };
            if batch.essence_hash != anchor.essence_hash() {
                warn!(
                    "pending batch {} disagrees with its confirmed anchor, discarding batch",
                    next
                );
                self.pending.remove(&next);
                return;
            }
            let batch = self.pending.remove(&next).expect("checked above");
            let anchor = self.anchors.remove(&next).expect("checked above");
            if let Err(e) = self.commit(batch, anchor) {
                match e {
                    StateError::Fatal(_) | StateError::OutOfSequence { .. } => {
                        error!("halting state manager: {e}");
                        self.halted = true;
                    }
                    other => error!("commit failed: {other}"),
                }
                return;
            }
        }
    }

    fn commit(&mut self, batch: Batch, anchor: AnchorTransaction) -> Result<()> {
        let state_index = batch.state_index;
        let committed_requests = batch.request_ids();
        self.current.apply(&batch)?;

        let record = StoredBatch {
            batch,
            anchor: anchor.clone(),
        };
        let record_bytes =
            bincode::serialize(&record).map_err(|e| StateError::Encode(e.to_string()))?;
        self.store.set_multi(&[
            (batch_key(&self.current.address, state_index), record_bytes),
            (state_key(&self.current.address), self.current.encode()?),
        ])?;

        self.metrics.batches_committed.inc();
        self.metrics.state_index.set(state_index as i64);
        self.incoming.retain(|&idx, _| idx > state_index);
        self.pending.retain(|&idx, _| idx > state_index);
        self.anchors.retain(|&idx, _| idx > state_index);
        self.syncer.prune_committed(state_index);
        self.last_anchor = Some(anchor.clone());

        info!(
            "STATE COMMITTED #{state_index} hash {} tx {}",
            self.current.hash().short(),
            anchor.tx_id.short()
        );
        self.broadcast_evidence();

        let _ = self.transitions.send(StateTransition {
            state: self.current.clone(),
            anchor: Some(anchor),
            committed_requests,
            synchronized: self.is_synchronized(),
        });
        Ok(())
    }

    fn broadcast_evidence(&mut self) {
        let msg = EvidenceMsg {
            state_index: self.current.state_index,
        };
        if let Ok(data) = msg.encode() {
            self.net.broadcast(MSG_STATE_INDEX_EVIDENCE, &data);
        }
        self.last_evidence_broadcast = Instant::now();
    }

    /// Send a batch (header, then updates in order) to one peer.
    fn send_batch(&self, peer_index: u16, batch: &Batch, anchor: Option<AnchorTransaction>) {
        let header = BatchHeaderMsg {
            state_index: batch.state_index,
            size: batch.size(),
            timestamp: batch.timestamp,
            essence_hash: batch.essence_hash,
            updates_digest: batch.updates_digest(),
            anchor,
        };
        let Ok(header_bytes) = header.encode() else {
            return;
        };
        if self
            .net
            .send(peer_index, MSG_BATCH_HEADER, &header_bytes)
            .is_err()
        {
            return;
        }
        for (seq, update) in batch.updates.iter().enumerate() {
            let msg = StateUpdateMsg {
                state_index: batch.state_index,
                seq: seq as u16,
                update: update.clone(),
            };
            let Ok(bytes) = msg.encode() else { return };
            if self.net.send(peer_index, MSG_STATE_UPDATE, &bytes).is_err() {
                return;
            }
        }
    }

    /// Broadcast a pending batch to every committee peer.
    fn send_batch_to_all(&self, batch: &Batch) {
        for peer_index in 0..self.net.size() {
            if peer_index == self.net.own_index() || !self.net.is_alive(peer_index) {
                continue;
            }
            self.send_batch(peer_index, batch, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::batch::StateUpdate,
        crossbeam_channel::{unbounded, Receiver},
        synod_monitoring::SynodMetrics,
        synod_peering::{PeerRegistry, PeeringConfig},
        synod_registry::MemKvStore,
        synod_types::{hash_data, AggregateSignature, Address, Color, HashValue, RequestId},
    };

    fn bootup() -> BootupData {
        BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec![
                "127.0.0.1:24000".into(),
                "127.0.0.1:24001".into(),
                "127.0.0.1:24002".into(),
                "127.0.0.1:24003".into(),
            ],
            access_nodes: vec![],
        }
    }

    fn make_manager() -> (StateManager, Receiver<StateTransition>, Arc<MemKvStore>) {
        let bootup = bootup();
        let store = Arc::new(MemKvStore::new());
        let metrics = Arc::new(SynodMetrics::new());
        let (inbound_tx, _inbound_rx) = unbounded();
        let registry = PeerRegistry::new(
            PeeringConfig::dev_default("127.0.0.1:24000"),
            inbound_tx,
            metrics.clone(),
        );
        let net = Arc::new(
            CommitteeNet::new(registry, bootup.committee_nodes.clone(), &[], 0).unwrap(),
        );
        let (tx, rx) = unbounded();
        let manager = StateManager::new(
            StateConfig::dev_default(),
            &bootup,
            store.clone(),
            net,
            metrics,
            tx,
        )
        .unwrap();
        (manager, rx, store)
    }

    fn batch_for(state: &VirtualState) -> Batch {
        let mut update = StateUpdate::new(RequestId::new(hash_data(b"req"), 0));
        update.set("x", vec![1]);
        Batch {
            state_index: state.state_index + 1,
            timestamp: 1_000,
            essence_hash: HashValue::nil(), // fixed up by anchor_for
            updates: vec![update],
        }
    }

    /// Build a confirmed anchor matching `batch`, patching the batch's
    /// essence hash the way the VM output does.
    fn anchor_for(state: &VirtualState, batch: &mut Batch) -> AnchorTransaction {
        let mut preview = state.clone();
        preview.apply(batch).unwrap();
        let draft = AnchorTransaction::draft(
            state.address,
            Color::new([3u8; 32]),
            batch.state_index,
            preview.hash(),
            batch.timestamp,
        );
        batch.essence_hash = draft.essence_hash();
        draft.finalize(AggregateSignature { bytes: vec![7; 32] })
    }

    #[test]
    fn test_starts_from_origin() {
        let (manager, _rx, store) = make_manager();
        assert_eq!(manager.state().state_index, 0);
        assert!(manager.is_synchronized());
        // origin persisted
        assert!(store.has(&state_key(&manager.state().address)).unwrap());
    }

    #[test]
    fn test_pending_then_anchor_commits() {
        let (mut manager, rx, store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);

        manager.handle_event(StateEvent::PendingBatch(batch.clone()));
        assert_eq!(manager.state().state_index, 0);

        manager.handle_event(StateEvent::StateTransaction(anchor.clone()));
        assert_eq!(manager.state().state_index, 1);

        let transition = rx.try_recv().unwrap();
        assert_eq!(transition.state.state_index, 1);
        assert!(transition.synchronized);
        assert_eq!(transition.anchor.unwrap().tx_id, anchor.tx_id);

        // batch + state persisted
        assert!(store
            .has(&batch_key(&manager.state().address, 1))
            .unwrap());
    }

    #[test]
    fn test_anchor_then_reassembled_batch_commits() {
        let (mut manager, rx, _store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);

        manager.handle_event(StateEvent::StateTransaction(anchor));
        assert_eq!(manager.state().state_index, 0);

        let header = BatchHeaderMsg {
            state_index: batch.state_index,
            size: batch.size(),
            timestamp: batch.timestamp,
            essence_hash: batch.essence_hash,
            updates_digest: batch.updates_digest(),
            anchor: None,
        };
        manager.handle_event(StateEvent::BatchHeader(header));
        for (seq, update) in batch.updates.iter().enumerate() {
            manager.handle_event(StateEvent::StateUpdate(StateUpdateMsg {
                state_index: batch.state_index,
                seq: seq as u16,
                update: update.clone(),
            }));
        }

        assert_eq!(manager.state().state_index, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_header_with_anchor_commits_without_ledger() {
        // catch-up path: a served batch carries its confirmed anchor
        let (mut manager, _rx, _store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);

        let header = BatchHeaderMsg {
            state_index: batch.state_index,
            size: batch.size(),
            timestamp: batch.timestamp,
            essence_hash: batch.essence_hash,
            updates_digest: batch.updates_digest(),
            anchor: Some(anchor),
        };
        manager.handle_event(StateEvent::BatchHeader(header));
        for (seq, update) in batch.updates.iter().enumerate() {
            manager.handle_event(StateEvent::StateUpdate(StateUpdateMsg {
                state_index: batch.state_index,
                seq: seq as u16,
                update: update.clone(),
            }));
        }
        assert_eq!(manager.state().state_index, 1);
    }

    #[test]
    fn test_digest_mismatch_discards() {
        let (mut manager, _rx, _store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);
        manager.handle_event(StateEvent::StateTransaction(anchor));

        let header = BatchHeaderMsg {
            state_index: batch.state_index,
            size: batch.size(),
            timestamp: batch.timestamp,
            essence_hash: batch.essence_hash,
            updates_digest: hash_data(b"wrong"),
            anchor: None,
        };
        manager.handle_event(StateEvent::BatchHeader(header));
        for (seq, update) in batch.updates.iter().enumerate() {
            manager.handle_event(StateEvent::StateUpdate(StateUpdateMsg {
                state_index: batch.state_index,
                seq: seq as u16,
                update: update.clone(),
            }));
        }
        assert_eq!(manager.state().state_index, 0);
    }

    #[test]
    fn test_essence_mismatch_discards_pending() {
        let (mut manager, _rx, _store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);

        // corrupt the pending batch's essence
        let mut wrong = batch.clone();
        wrong.essence_hash = hash_data(b"divergent");
        manager.handle_event(StateEvent::PendingBatch(wrong));
        manager.handle_event(StateEvent::StateTransaction(anchor));

        assert_eq!(manager.state().state_index, 0);
    }

    #[test]
    fn test_stale_events_ignored() {
        let (mut manager, rx, _store) = make_manager();
        let mut batch = batch_for(manager.state());
        let anchor = anchor_for(manager.state(), &mut batch);
        manager.handle_event(StateEvent::PendingBatch(batch.clone()));
        manager.handle_event(StateEvent::StateTransaction(anchor.clone()));
        assert_eq!(manager.state().state_index, 1);
        rx.try_recv().unwrap();

        // replays are dropped silently
        manager.handle_event(StateEvent::StateTransaction(anchor));
        manager.handle_event(StateEvent::PendingBatch(batch));
        assert_eq!(manager.state().state_index, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_evidence_tracks_maximum() {
        let (mut manager, _rx, _store) = make_manager();
        manager.handle_event(StateEvent::EvidenceStateIndex {
            sender_index: 2,
            state_index: 8,
        });
        assert!(!manager.is_synchronized());
        manager.handle_event(StateEvent::EvidenceStateIndex {
            sender_index: 1,
            state_index: 3,
        });
        assert_eq!(manager.largest_evidenced, 8);
    }

    #[test]
    fn test_get_batch_for_uncommitted_index_is_dropped() {
        let (mut manager, _rx, _store) = make_manager();
        manager.handle_event(StateEvent::GetBatch {
            sender_index: 1,
            msg: GetBatchMsg { state_index: 5 },
        });
        // nothing to assert beyond "no panic, no state change"
        assert_eq!(manager.state().state_index, 0);
    }
}
