//! The committee node: boot, event loops, dismissal.

use {
    crate::{
        dispatch::{route_inbound, route_ledger_event, Routed},
        error::{CoreError, Result},
    },
    crossbeam_channel::{unbounded, select, Receiver, Sender},
    log::{debug, info},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
    synod_consensus::{ConsensusConfig, Operator, OperatorEvent},
    synod_ledger::LedgerClient,
    synod_monitoring::{Publisher, SynodMetrics},
    synod_peering::{CommitteeNet, PeerRegistry, PeeringConfig},
    synod_registry::{BootupData, KvStore},
    synod_state::{StateConfig, StateEvent, StateManager, StateTransition},
    synod_types::{Address, ThresholdScheme},
    synod_vm::ProcessorRegistry,
};

/// How long event loops sleep between exit-flag checks when idle.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Configuration of one committee node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub peering: PeeringConfig,
    pub consensus: ConsensusConfig,
    pub state: StateConfig,
    /// Cadence of the timer tick fanned out to both event machines.
    /// Default: 100 ms.
    pub tick_interval: Duration,
}

impl NodeConfig {
    pub fn new(listen_addr: &str) -> Self {
        Self {
            peering: PeeringConfig {
                listen_addr: listen_addr.to_string(),
                ..PeeringConfig::default()
            },
            consensus: ConsensusConfig::default(),
            state: StateConfig::default(),
            tick_interval: Duration::from_millis(100),
        }
    }

    /// Config for local testing: everything short.
    pub fn dev_default(listen_addr: &str) -> Self {
        Self {
            peering: PeeringConfig::dev_default(listen_addr),
            consensus: ConsensusConfig::dev_default(),
            state: StateConfig::dev_default(),
            tick_interval: Duration::from_millis(10),
        }
    }
}

/// One running committee node for one contract instance.
pub struct CommitteeNode {
    address: Address,
    exit: Arc<AtomicBool>,
    registry: Arc<PeerRegistry>,
    metrics: Arc<SynodMetrics>,
    threads: Vec<JoinHandle<()>>,
    _runtime: tokio::runtime::Runtime,
}

impl CommitteeNode {
    /// Boot a committee node from its descriptor. Errors here (bad
    /// descriptor, port taken, corrupt persisted state) surface to the
    /// caller; after this returns the node only logs and retries.
    pub fn start(
        config: NodeConfig,
        bootup: BootupData,
        store: Arc<dyn KvStore>,
        scheme: Arc<dyn ThresholdScheme>,
        ledger: Arc<dyn LedgerClient>,
        processors: Arc<ProcessorRegistry>,
        publisher: Publisher,
    ) -> Result<Self> {
        bootup.validate()?;
        let own_index = bootup
            .peer_index_of(&config.peering.listen_addr)
            .ok_or_else(|| CoreError::NotInCommittee(config.peering.listen_addr.clone()))?;

        let metrics = Arc::new(SynodMetrics::new());
        let (inbound_tx, inbound_rx) = unbounded();
        let registry = PeerRegistry::new(config.peering.clone(), inbound_tx, metrics.clone());
        let net = Arc::new(CommitteeNet::new(
            registry.clone(),
            bootup.committee_nodes.clone(),
            &bootup.access_nodes,
            own_index,
        )?);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("synodPeering")
            .enable_all()
            .build()?;
        runtime.block_on(registry.start())?;

        let (operator_tx, operator_rx) = unbounded::<OperatorEvent>();
        let (state_tx, state_rx) = unbounded::<StateEvent>();
        let (transition_tx, transition_rx) = unbounded::<StateTransition>();
        let ledger_rx = ledger.subscribe(&bootup.address);

        let state_manager = StateManager::new(
            config.state.clone(),
            &bootup,
            store,
            net.clone(),
            metrics.clone(),
            transition_tx,
        )?;
        let operator = Operator::new(
            config.consensus.clone(),
            bootup.address,
            bootup.color,
            bootup.owner_address,
            net.clone(),
            scheme,
            ledger,
            processors,
            publisher,
            metrics.clone(),
            operator_tx.clone(),
            state_tx.clone(),
        );

        let exit = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();

        threads.push(spawn_named("synodOperator", {
            let exit = exit.clone();
            move || operator_loop(operator, operator_rx, transition_rx, exit)
        })?);
        threads.push(spawn_named("synodStateMgr", {
            let exit = exit.clone();
            move || state_loop(state_manager, state_rx, exit)
        })?);
        threads.push(spawn_named("synodDispatch", {
            let exit = exit.clone();
            let operator_tx = operator_tx.clone();
            let state_tx = state_tx.clone();
            move || dispatch_loop(net, inbound_rx, ledger_rx, operator_tx, state_tx, exit)
        })?);
        threads.push(spawn_named("synodTimer", {
            let exit = exit.clone();
            let tick_interval = config.tick_interval;
            move || timer_loop(tick_interval, operator_tx, state_tx, exit)
        })?);

        info!(
            "committee node up for {} (peer index {own_index} of {})",
            bootup.address,
            bootup.size()
        );
        Ok(Self {
            address: bootup.address,
            exit,
            registry,
            metrics,
            threads,
            _runtime: runtime,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn metrics(&self) -> Arc<SynodMetrics> {
        self.metrics.clone()
    }

    /// Committee peers currently connected and handshaken.
    pub fn alive_peers(&self) -> usize {
        self.registry.alive_count()
    }

    /// Dismiss the committee: close connections, drain and stop the
    /// event loops, stop the timers. A still-running VM task finishes on
    /// its worker thread and its completion lands in a closed inbox.
    pub fn dismiss(mut self) {
        info!("dismissing committee node for {}", self.address);
        self.exit.store(true, Ordering::SeqCst);
        self.registry.shutdown();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn spawn_named(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new().name(name.to_string()).spawn(body)?)
}

// ── Event loops ─────────────────────────────────────────────────────────

fn operator_loop(
    mut operator: Operator,
    events: Receiver<OperatorEvent>,
    transitions: Receiver<StateTransition>,
    exit: Arc<AtomicBool>,
) {
    loop {
        if exit.load(Ordering::SeqCst) {
            break;
        }
        select! {
            recv(events) -> event => match event {
                Ok(event) => operator.handle_event(event),
                Err(_) => break,
            },
            recv(transitions) -> transition => match transition {
                Ok(transition) => {
                    operator.handle_event(OperatorEvent::StateTransition(transition))
                }
                Err(_) => break,
            },
            default(IDLE_POLL) => {}
        }
    }
    debug!("operator loop stopped");
}

fn state_loop(mut manager: StateManager, events: Receiver<StateEvent>, exit: Arc<AtomicBool>) {
    // seed the operator with the loaded state
    manager.announce_current();
    loop {
        if exit.load(Ordering::SeqCst) {
            break;
        }
        match events.recv_timeout(IDLE_POLL) {
            Ok(event) => manager.handle_event(event),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("state manager loop stopped");
}

fn dispatch_loop(
    net: Arc<CommitteeNet>,
    inbound: Receiver<synod_peering::InboundMessage>,
    ledger_events: Receiver<synod_ledger::LedgerEvent>,
    operator_tx: Sender<OperatorEvent>,
    state_tx: Sender<StateEvent>,
    exit: Arc<AtomicBool>,
) {
    loop {
        if exit.load(Ordering::SeqCst) {
            break;
        }
        select! {
            recv(inbound) -> message => match message {
                Ok(message) => {
                    match route_inbound(&net, message) {
                        Some(Routed::Operator(event)) => {
                            let _ = operator_tx.send(event);
                        }
                        Some(Routed::State(event)) => {
                            let _ = state_tx.send(event);
                        }
                        None => {}
                    }
                }
                Err(_) => break,
            },
            recv(ledger_events) -> event => match event {
                Ok(event) => {
                    let (state_event, operator_events) = route_ledger_event(event);
                    if let Some(event) = state_event {
                        let _ = state_tx.send(event);
                    }
                    for event in operator_events {
                        let _ = operator_tx.send(event);
                    }
                }
                Err(_) => break,
            },
            default(IDLE_POLL) => {}
        }
    }
    debug!("dispatch loop stopped");
}

fn timer_loop(
    tick_interval: Duration,
    operator_tx: Sender<OperatorEvent>,
    state_tx: Sender<StateEvent>,
    exit: Arc<AtomicBool>,
) {
    let mut tick: u64 = 0;
    loop {
        if exit.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(tick_interval);
        tick += 1;
        if operator_tx.send(OperatorEvent::TimerTick(tick)).is_err() {
            break;
        }
        if state_tx.send(StateEvent::TimerTick(tick)).is_err() {
            break;
        }
    }
    debug!("timer loop stopped after {tick} ticks");
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::time::Instant,
        synod_ledger::{AnchorTransaction, Balances, MemLedger, RequestBlock},
        synod_types::{AggregateSignature, Color, DevScheme, HashValue},
        synod_vm::NullFactory,
    };

    fn free_addr() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        format!("127.0.0.1:{}", addr.port())
    }

    fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        cond()
    }

    fn request_tx(address: Address, color: Color) -> AnchorTransaction {
        let mut block = RequestBlock::default();
        block.code = 1;
        block.args.insert("greeting".into(), b"hello".to_vec());
        let mut tx = AnchorTransaction::draft(address, color, 0, HashValue::nil(), 1);
        tx.requests.push(block);
        tx.finalize(AggregateSignature { bytes: vec![9; 32] })
    }

    #[test]
    fn test_single_node_commits_injected_request() {
        let addr = free_addr();
        let bootup = BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec![addr.clone()],
            access_nodes: vec![],
        };
        let ledger = Arc::new(MemLedger::new());
        ledger.set_balances(bootup.address, Balances::new().with(bootup.color, 100));

        let node = CommitteeNode::start(
            NodeConfig::dev_default(&addr),
            bootup.clone(),
            Arc::new(synod_registry::MemKvStore::new()),
            Arc::new(DevScheme::new(0, 1, [7u8; 32])),
            ledger.clone(),
            ProcessorRegistry::new(Arc::new(NullFactory)),
            Publisher::new(),
        )
        .unwrap();

        ledger.inject(request_tx(bootup.address, bootup.color));

        let metrics = node.metrics();
        assert!(
            wait_until(
                || metrics.snapshot().batches_committed >= 1,
                Duration::from_secs(10)
            ),
            "single-node committee should commit the injected request"
        );
        assert!(metrics.snapshot().anchors_submitted >= 1);
        node.dismiss();
    }

    #[test]
    fn test_boot_rejects_foreign_listen_addr() {
        let bootup = BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec!["127.0.0.1:1".into()],
            access_nodes: vec![],
        };
        let result = CommitteeNode::start(
            NodeConfig::dev_default(&free_addr()),
            bootup,
            Arc::new(synod_registry::MemKvStore::new()),
            Arc::new(DevScheme::new(0, 1, [7u8; 32])),
            Arc::new(MemLedger::new()),
            ProcessorRegistry::new(Arc::new(NullFactory)),
            Publisher::new(),
        );
        assert!(matches!(result, Err(CoreError::NotInCommittee(_))));
    }

    #[test]
    fn test_dismiss_is_clean() {
        let addr = free_addr();
        let bootup = BootupData {
            address: Address::new([4u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec![addr.clone()],
            access_nodes: vec![],
        };
        let node = CommitteeNode::start(
            NodeConfig::dev_default(&addr),
            bootup,
            Arc::new(synod_registry::MemKvStore::new()),
            Arc::new(DevScheme::new(0, 1, [7u8; 32])),
            Arc::new(MemLedger::new()),
            ProcessorRegistry::new(Arc::new(NullFactory)),
            Publisher::new(),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        node.dismiss();
    }
}
