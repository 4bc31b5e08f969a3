//! The consensus operator state machine.
//!
//! All mutations happen on a single event context: the committee node
//! feeds one [`OperatorEvent`] at a time from the operator's inbox, and
//! every handler finishes by re-running [`Operator::take_action`], the
//! idempotent driving routine. The operator never blocks — peer sends
//! are queued, ledger submissions are fire-and-forget, and VM tasks run
//! on a worker thread that posts an [`OperatorEvent::ResultCalculated`]
//! back to the inbox.

use {
    crate::{
        backlog::Backlog,
        config::ConsensusConfig,
        error::{ConsensusError, Result},
        leader::{leader_index, permutation},
        messages::{
            batch_hash, NotifyReqMsg, SignedHashMsg, StartProcessingBatchMsg,
            MSG_NOTIFY_REQUESTS, MSG_SIGNED_HASH, MSG_START_PROCESSING_BATCH,
        },
    },
    crossbeam_channel::Sender,
    log::{debug, info, warn},
    std::{
        collections::HashMap,
        sync::Arc,
        time::Instant,
    },
    synod_ledger::{Balances, LedgerClient, RequestBlock},
    synod_monitoring::{Publisher, SynodMetrics},
    synod_peering::CommitteeNet,
    synod_state::{StateEvent, StateTransition, VirtualState},
    synod_types::{now_nanos, Address, Color, HashValue, RequestId, SigShare, ThresholdScheme},
    synod_vm::{spawn_task, ProcessorRegistry, VmCompletion, VmTaskInput, VmTaskOutput},
};

/// Events processed by the operator.
#[derive(Debug)]
pub enum OperatorEvent {
    /// A processor finished loading.
    ProcessorReady { program_hash: HashValue },
    /// The state manager committed a new state.
    StateTransition(StateTransition),
    /// Fresh balances arrived from the ledger.
    Balances(Balances),
    /// A request block addressed to the contract was confirmed.
    Request { id: RequestId, block: RequestBlock },
    /// A peer tells the leader which requests it has seen.
    NotifyRequests { sender_index: u16, msg: NotifyReqMsg },
    /// The leader orders a batch to be processed.
    StartProcessingBatch {
        sender_index: u16,
        msg: StartProcessingBatchMsg,
    },
    /// The local VM task finished.
    ResultCalculated(VmCompletion),
    /// A follower returned a signature share.
    SignedHash { sender_index: u16, msg: SignedHashMsg },
    /// Periodic tick from the node's timer.
    TimerTick(u64),
}

struct SignedResult {
    essence_hash: HashValue,
    sig_share: SigShare,
}

/// Present only on the leader, for the round it is driving.
struct LeaderStatus {
    batch_hash: HashValue,
    request_ids: Vec<RequestId>,
    timestamp: i64,
    /// Our own VM output; the anchor draft to finalize.
    own_result: Option<VmTaskOutput>,
    /// Essence hash of our own result; shares must match it.
    own_essence: Option<HashValue>,
    /// Shares per sender, own share included.
    signed_results: HashMap<u16, SignedResult>,
}

/// See the module doc.
pub struct Operator {
    config: ConsensusConfig,
    address: Address,
    color: Color,
    reward_address: Address,
    net: Arc<CommitteeNet>,
    scheme: Arc<dyn ThresholdScheme>,
    ledger: Arc<dyn LedgerClient>,
    processors: Arc<ProcessorRegistry>,
    publisher: Publisher,
    metrics: Arc<SynodMetrics>,
    /// Our own inbox, for VM completions and processor-ready callbacks.
    self_tx: Sender<OperatorEvent>,
    /// The state manager's inbox, for pending batches.
    to_state_manager: Sender<StateEvent>,

    state: Option<VirtualState>,
    state_hash: HashValue,
    synchronized: bool,
    permutation: Vec<u16>,
    rotation_offset: u32,
    rotation_deadline: Option<Instant>,
    leader_status: Option<LeaderStatus>,
    backlog: Backlog,
    /// Notifications for a future state index, applied on transition.
    notifications: HashMap<u32, Vec<(u16, Vec<RequestId>)>>,
    balances: Option<Balances>,
    balances_deadline: Option<Instant>,
    balances_requested_at: Option<Instant>,
    processor_ready: bool,
    vm_task_running: bool,
    last_batch_timestamp: i64,
}

impl Operator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConsensusConfig,
        address: Address,
        color: Color,
        reward_address: Address,
        net: Arc<CommitteeNet>,
        scheme: Arc<dyn ThresholdScheme>,
        ledger: Arc<dyn LedgerClient>,
        processors: Arc<ProcessorRegistry>,
        publisher: Publisher,
        metrics: Arc<SynodMetrics>,
        self_tx: Sender<OperatorEvent>,
        to_state_manager: Sender<StateEvent>,
    ) -> Self {
        Self {
            config,
            address,
            color,
            reward_address,
            net,
            scheme,
            ledger,
            processors,
            publisher,
            metrics,
            self_tx,
            to_state_manager,
            state: None,
            state_hash: HashValue::nil(),
            synchronized: false,
            permutation: Vec::new(),
            rotation_offset: 0,
            rotation_deadline: None,
            leader_status: None,
            backlog: Backlog::new(),
            notifications: HashMap::new(),
            balances: None,
            balances_deadline: None,
            balances_requested_at: None,
            processor_ready: false,
            vm_task_running: false,
            last_batch_timestamp: 0,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Current state index, `None` before the first transition.
    pub fn state_index(&self) -> Option<u32> {
        self.state.as_ref().map(|s| s.state_index)
    }

    /// The leader for the current state and rotation offset.
    pub fn current_leader(&self) -> Option<u16> {
        let state = self.state.as_ref()?;
        if self.permutation.is_empty() {
            return None;
        }
        Some(leader_index(
            &self.permutation,
            state.state_index,
            self.rotation_offset,
        ))
    }

    /// True iff the local node leads the current round.
    pub fn is_leader(&self) -> bool {
        self.current_leader() == Some(self.net.own_index())
    }

    pub fn rotation_offset(&self) -> u32 {
        self.rotation_offset
    }

    pub fn vm_task_running(&self) -> bool {
        self.vm_task_running
    }

    pub fn has_leader_status(&self) -> bool {
        self.leader_status.is_some()
    }

    /// Batch hash of the in-flight proposal, if we lead one.
    pub fn leader_batch_hash(&self) -> Option<HashValue> {
        self.leader_status.as_ref().map(|ls| ls.batch_hash)
    }

    /// Signature shares collected for the in-flight proposal.
    pub fn signed_share_count(&self) -> usize {
        self.leader_status
            .as_ref()
            .map(|ls| ls.signed_results.len())
            .unwrap_or(0)
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    // ── Event processing ────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: OperatorEvent) {
        match event {
            OperatorEvent::ProcessorReady { program_hash } => {
                self.on_processor_ready(program_hash)
            }
            OperatorEvent::StateTransition(transition) => self.on_state_transition(transition),
            OperatorEvent::Balances(balances) => self.on_balances(balances),
            OperatorEvent::Request { id, block } => self.on_request(id, block),
            OperatorEvent::NotifyRequests { sender_index, msg } => {
                self.on_notify_requests(sender_index, msg)
            }
            OperatorEvent::StartProcessingBatch { sender_index, msg } => {
                self.on_start_processing_batch(sender_index, msg)
            }
            OperatorEvent::ResultCalculated(completion) => self.on_result_calculated(completion),
            OperatorEvent::SignedHash { sender_index, msg } => {
                self.on_signed_hash(sender_index, msg)
            }
            OperatorEvent::TimerTick(tick) => self.on_timer_tick(tick),
        }
    }

    fn on_processor_ready(&mut self, program_hash: HashValue) {
        if self.processor_ready {
            return;
        }
        let expected = self.state.as_ref().and_then(|s| s.program_hash());
        if expected != Some(program_hash) {
            return;
        }
        self.processor_ready = true;
        info!("user defined VM processor is ready, program hash {program_hash}");
        self.publisher.publish(
            "vmready",
            &[&self.address.to_string(), &program_hash.to_string()],
        );
        self.take_action();
    }

    fn on_state_transition(&mut self, transition: StateTransition) {
        let new_index = transition.state.state_index;
        self.state_hash = transition.state.hash();
        self.synchronized = transition.synchronized;
        self.permutation = permutation(self.net.size(), &self.state_hash);
        self.rotation_offset = 0;
        self.leader_status = None;
        self.state = Some(transition.state);

        info!(
            "STATE FOR CONSENSUS #{new_index}, synced: {}, leader: {:?}, i am the leader: {}",
            self.synchronized,
            self.current_leader(),
            self.is_leader()
        );
        debug!("state hash {}", self.state_hash.short());

        // remove all processed requests from the local backlog
        let removed = self
            .backlog
            .remove_committed(&transition.committed_requests);
        if removed > 0 {
            debug!("{removed} committed requests pruned from backlog");
        }
        self.metrics.backlog_size.set(self.backlog.len() as i64);

        // apply notifications stored for this index, drop older ones
        self.notifications.retain(|&idx, _| idx >= new_index);
        if let Some(stored) = self.notifications.remove(&new_index) {
            for (sender, ids) in stored {
                self.backlog.mark_notified(sender, &ids);
            }
        }

        self.set_rotation_deadline();
        self.send_request_notifications(None);
        self.check_processor();
        self.take_action();
    }

    fn on_balances(&mut self, balances: Balances) {
        debug!("balances arrived: {} colors", balances.by_color.len());
        self.balances = Some(balances);
        self.balances_deadline = Some(Instant::now() + self.config.request_balances_period);
        self.balances_requested_at = None;
        self.take_action();
    }

    fn on_request(&mut self, id: RequestId, block: RequestBlock) {
        if let Err(e) = self.validate_request(&id, &block) {
            warn!("request {} validation failed, ignored: {e}", id.short());
            return;
        }
        let is_new = self.backlog.insert(id, block, now_nanos());
        if is_new {
            debug!(
                "new request {} (backlog {})",
                id.short(),
                self.backlog.len()
            );
            self.metrics.backlog_size.set(self.backlog.len() as i64);
            self.publisher.publish(
                "request_in",
                &[
                    &self.address.to_string(),
                    &id.tx_id.to_string(),
                    &id.block_index.to_string(),
                ],
            );
        }
        self.send_request_notifications(Some(vec![id]));
        if self.rotation_deadline.is_none() {
            self.set_rotation_deadline();
        }
        self.take_action();
    }

    fn on_notify_requests(&mut self, sender_index: u16, msg: NotifyReqMsg) {
        let Some(current) = self.state_index() else {
            return;
        };
        if msg.state_index == current {
            self.backlog.mark_notified(sender_index, &msg.request_ids);
        } else if msg.state_index == current + 1 {
            // keep for the next transition
            let stored = self.notifications.entry(msg.state_index).or_default();
            if stored.len() < 4 * self.net.size() as usize {
                stored.push((sender_index, msg.request_ids));
            }
        } else {
            debug!(
                "notification for state index {} out of context (current {current})",
                msg.state_index
            );
            return;
        }
        self.take_action();
    }

    fn on_start_processing_batch(&mut self, sender_index: u16, msg: StartProcessingBatchMsg) {
        let Some(current) = self.state_index() else {
            return;
        };
        if msg.state_index != current {
            debug!(
                "processing order for state index {} out of context (current {current})",
                msg.state_index
            );
            return;
        }
        if self.vm_task_running {
            debug!("vm task already running, dropping processing order");
            return;
        }
        let Some(requests) = self.backlog.collect_blocks(&msg.request_ids) else {
            debug!("cannot process ordered batch: some requests are missing locally");
            return;
        };
        self.dispatch_vm_task(
            requests,
            msg.timestamp,
            msg.balances,
            msg.reward_address,
            sender_index,
        );
    }

    fn on_result_calculated(&mut self, completion: VmCompletion) {
        // the flag clears before any further state is touched
        self.vm_task_running = false;

        let output = match completion.result {
            Ok(output) => output,
            Err(e) => {
                warn!("vm task failed: {e}; idle until next rotation");
                return;
            }
        };
        let Some(current) = self.state_index() else {
            return;
        };
        if output.batch.state_index != current + 1 {
            debug!(
                "vm result for state index {} out of context (current {current})",
                output.batch.state_index
            );
            return;
        }

        // messages the program published during the run
        let program_hash = completion.program_hash.to_string();
        for message in &output.messages {
            self.publisher.publish("vmmsg", &[&program_hash, message]);
        }

        // the state manager holds the batch until its anchor confirms
        let _ = self
            .to_state_manager
            .send(StateEvent::PendingBatch(output.batch.clone()));

        if completion.leader_peer_index == self.net.own_index() {
            self.save_own_result(output);
        } else {
            self.send_result_to_leader(completion.leader_peer_index, &output);
        }
        self.take_action();
    }

    fn on_signed_hash(&mut self, sender_index: u16, msg: SignedHashMsg) {
        let Some(current) = self.state_index() else {
            return;
        };
        let Some(ls) = &mut self.leader_status else {
            debug!("signature share without leader status, ignored");
            return;
        };
        if msg.state_index != current {
            return;
        }
        if msg.batch_hash != ls.batch_hash {
            warn!(
                "signature share for foreign batch {} (expected {})",
                msg.batch_hash.short(),
                ls.batch_hash.short()
            );
            return;
        }
        if ls.signed_results.contains_key(&sender_index) {
            debug!("repeated signature share from peer {sender_index}");
            return;
        }
        if let Some(own) = ls.own_essence {
            if msg.essence_hash != own {
                // honest-majority assumption: ignore, no penalty
                warn!(
                    "peer {sender_index} signed essence {} but ours is {}",
                    msg.essence_hash.short(),
                    own.short()
                );
                return;
            }
        }
        ls.signed_results.insert(
            sender_index,
            SignedResult {
                essence_hash: msg.essence_hash,
                sig_share: msg.sig_share,
            },
        );
        self.take_action();
    }

    fn on_timer_tick(&mut self, tick: u64) {
        if tick % self.config.telemetry_tick == 0 {
            let quorum = self.scheme.threshold() as usize;
            info!(
                "timer tick #{tick}: state index {:?}, backlog {}, selection {}, shares {}",
                self.state_index(),
                self.backlog.len(),
                self.backlog
                    .select_ready(quorum.saturating_sub(1), self.config.max_batch)
                    .len(),
                self.signed_share_count(),
            );
            self.metrics.backlog_size.set(self.backlog.len() as i64);
        }
        if tick % self.config.action_tick == 0 {
            self.take_action();
        }
    }

    // ── takeAction: the driving routine ─────────────────────────────────

    /// Idempotent; run after every state change and on timer ticks.
    pub fn take_action(&mut self) {
        if self.state.is_none() || !self.synchronized || !self.processor_ready {
            return;
        }
        self.rotate_leader_if_overdue();
        if self.is_leader() {
            self.take_action_leader();
        } else if self.stale_balances() {
            self.request_balances();
        }
    }

    fn rotate_leader_if_overdue(&mut self) {
        let Some(deadline) = self.rotation_deadline else {
            return;
        };
        if Instant::now() <= deadline {
            return;
        }
        self.rotation_offset += 1;
        self.leader_status = None;
        self.metrics.leader_rotations.inc();
        self.set_rotation_deadline();
        info!(
            "leader rotation: offset {}, new leader {:?}",
            self.rotation_offset,
            self.current_leader()
        );
        self.send_request_notifications(None);
    }

    fn take_action_leader(&mut self) {
        if self.leader_status.is_none() {
            self.propose_batch();
            return;
        }
        self.aggregate_and_submit();
    }

    /// Leader step (a): select requests, order the committee to process
    /// them, and start the identical task locally.
    fn propose_batch(&mut self) {
        if self.vm_task_running {
            return;
        }
        let Some(balances) = self.balances.clone() else {
            if self.stale_balances() {
                self.request_balances();
            }
            return;
        };
        let quorum = self.scheme.threshold() as usize;
        let ids = self
            .backlog
            .select_ready(quorum.saturating_sub(1), self.config.max_batch);
        if ids.is_empty() {
            return;
        }
        let Some(requests) = self.backlog.collect_blocks(&ids) else {
            return;
        };
        let Some(current) = self.state_index() else {
            return;
        };

        // batch timestamps are strictly monotone per leader
        let timestamp = now_nanos().max(self.last_batch_timestamp + 1);
        self.last_batch_timestamp = timestamp;
        let bh = batch_hash(&ids, timestamp);

        let order = StartProcessingBatchMsg {
            state_index: current,
            request_ids: ids.clone(),
            timestamp,
            balances: balances.clone(),
            reward_address: self.reward_address,
        };
        match order.encode() {
            Ok(data) => {
                let holders = self.backlog.peers_holding_all(&ids, self.net.size());
                for peer in holders {
                    if peer == self.net.own_index() {
                        continue;
                    }
                    if let Err(e) = self.net.send(peer, MSG_START_PROCESSING_BATCH, &data) {
                        debug!("processing order to peer {peer} not sent: {e}");
                    }
                }
            }
            Err(e) => {
                warn!("processing order encode failed: {e}");
                return;
            }
        }

        info!(
            "proposing batch of {} requests at state index {current} (batch hash {})",
            ids.len(),
            bh.short()
        );
        self.leader_status = Some(LeaderStatus {
            batch_hash: bh,
            request_ids: ids,
            timestamp,
            own_result: None,
            own_essence: None,
            signed_results: HashMap::new(),
        });
        let own = self.net.own_index();
        let reward_address = self.reward_address;
        self.dispatch_vm_task(requests, timestamp, balances, reward_address, own);
    }

    /// Leader step (b): once enough shares agree with our own essence,
    /// aggregate and submit the anchor.
    fn aggregate_and_submit(&mut self) {
        let quorum = self.scheme.threshold() as usize;
        let Some(ls) = &self.leader_status else {
            return;
        };
        let Some(own_essence) = ls.own_essence else {
            // our own task has not completed yet
            return;
        };
        let shares: Vec<SigShare> = ls
            .signed_results
            .values()
            .filter(|r| {
                r.essence_hash == own_essence
                    && self.scheme.verify_share(&own_essence, &r.sig_share)
            })
            .map(|r| r.sig_share.clone())
            .collect();
        if shares.len() < quorum {
            return;
        }
        let Some(own_result) = &ls.own_result else {
            return;
        };

        match self.scheme.aggregate(&own_essence, &shares) {
            Ok(signature) => {
                let tx = own_result.anchor_draft.clone().finalize(signature);
                info!(
                    "quorum of {} shares over batch of {} requests (ts {}), submitting anchor {} for state index {}",
                    shares.len(),
                    ls.request_ids.len(),
                    ls.timestamp,
                    tx.tx_id.short(),
                    tx.state_index
                );
                self.metrics.anchors_submitted.inc();
                if let Err(e) = self.ledger.submit(tx) {
                    warn!("anchor submission failed: {e}; will re-propose");
                }
            }
            Err(e) => {
                warn!("share aggregation failed: {e}; will re-propose");
            }
        }
        // cleared on success and on failure; a retry tick re-proposes
        self.leader_status = None;
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn validate_request(&self, _id: &RequestId, block: &RequestBlock) -> Result<()> {
        if block.code == 0 {
            return Err(ConsensusError::ValidationFailed(
                "reserved request code 0".to_string(),
            ));
        }
        if block.args.keys().any(|k| k.is_empty()) {
            return Err(ConsensusError::ValidationFailed(
                "empty argument name".to_string(),
            ));
        }
        Ok(())
    }

    fn set_rotation_deadline(&mut self) {
        self.rotation_deadline = Some(Instant::now() + self.config.leader_rotation_period);
    }

    fn stale_balances(&self) -> bool {
        match self.balances_deadline {
            None => true,
            Some(deadline) => Instant::now() > deadline,
        }
    }

    fn request_balances(&mut self) {
        let recently_asked = self
            .balances_requested_at
            .map(|t| t.elapsed() < self.config.balances_retry)
            .unwrap_or(false);
        if recently_asked {
            return;
        }
        if let Err(e) = self.ledger.request_balances(&self.address) {
            warn!("balance request failed: {e}");
            return;
        }
        self.balances_requested_at = Some(Instant::now());
    }

    /// Tell the current leader which requests we hold. `subset` narrows
    /// to freshly arrived requests; `None` sends the full backlog.
    fn send_request_notifications(&mut self, subset: Option<Vec<RequestId>>) {
        let Some(current) = self.state_index() else {
            return;
        };
        let Some(leader) = self.current_leader() else {
            return;
        };
        if leader == self.net.own_index() {
            return;
        }
        let request_ids = subset.unwrap_or_else(|| self.backlog.all_ids());
        if request_ids.is_empty() {
            return;
        }
        let msg = NotifyReqMsg {
            state_index: current,
            request_ids,
        };
        match msg.encode() {
            Ok(data) => {
                if let Err(e) = self.net.send(leader, MSG_NOTIFY_REQUESTS, &data) {
                    debug!("request notification to leader {leader} not sent: {e}");
                }
            }
            Err(e) => warn!("notification encode failed: {e}"),
        }
    }

    fn check_processor(&mut self) {
        self.processor_ready = false;
        let Some(program_hash) = self.state.as_ref().and_then(|s| s.program_hash()) else {
            warn!("program hash is undefined; committee cannot load and run the VM");
            return;
        };
        if self.processors.check(&program_hash) {
            self.processor_ready = true;
            return;
        }
        let inbox = self.self_tx.clone();
        self.processors.load_async(program_hash, move |outcome| {
            if outcome.is_ok() {
                let _ = inbox.send(OperatorEvent::ProcessorReady { program_hash });
            }
        });
    }

    fn dispatch_vm_task(
        &mut self,
        requests: Vec<(RequestId, RequestBlock)>,
        timestamp: i64,
        balances: Balances,
        reward_address: Address,
        leader_peer_index: u16,
    ) {
        let Some(state) = &self.state else {
            return;
        };
        let Some(program_hash) = state.program_hash() else {
            return;
        };
        let Some(processor) = self.processors.get(&program_hash) else {
            debug!("processor not ready, task not dispatched");
            return;
        };
        let input = VmTaskInput {
            address: self.address,
            color: self.color,
            program_hash,
            state: state.clone(),
            requests,
            timestamp,
            balances,
            reward_address,
            leader_peer_index,
        };
        self.vm_task_running = true;
        let inbox = self.self_tx.clone();
        spawn_task(processor, input, self.metrics.clone(), move |completion| {
            let _ = inbox.send(OperatorEvent::ResultCalculated(completion));
        });
    }

    /// Leader: record our own result and share.
    fn save_own_result(&mut self, output: VmTaskOutput) {
        let own = self.net.own_index();
        let share = self.scheme.sign_share(&output.essence_hash);
        let Some(ls) = &mut self.leader_status else {
            // rotated away while the task ran
            debug!("own vm result arrived without leader status, discarded");
            return;
        };
        ls.own_essence = Some(output.essence_hash);
        ls.signed_results.insert(
            own,
            SignedResult {
                essence_hash: output.essence_hash,
                sig_share: share,
            },
        );
        ls.own_result = Some(output);
    }

    /// Follower: sign the essence and send the share to the leader.
    fn send_result_to_leader(&mut self, leader: u16, output: &VmTaskOutput) {
        let Some(current) = self.state_index() else {
            return;
        };
        let msg = SignedHashMsg {
            state_index: current,
            batch_hash: batch_hash(&output.batch.request_ids(), output.batch.timestamp),
            essence_hash: output.essence_hash,
            sig_share: self.scheme.sign_share(&output.essence_hash),
        };
        match msg.encode() {
            Ok(data) => {
                if let Err(e) = self.net.send(leader, MSG_SIGNED_HASH, &data) {
                    debug!("signature share to leader {leader} not sent: {e}");
                }
            }
            Err(e) => warn!("signature share encode failed: {e}"),
        }
    }
}
