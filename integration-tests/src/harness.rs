//! Test cluster: N committee nodes over loopback TCP.

use {
    std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
    synod_consensus::{leader_index, permutation},
    synod_core::{CommitteeNode, NodeConfig},
    synod_ledger::{AnchorTransaction, Balances, MemLedger, RequestBlock},
    synod_monitoring::{Publisher, SynodMetrics},
    synod_registry::{
        load_bootup_data, save_bootup_data, state_key, BootupData, KvStore, MemKvStore,
    },
    synod_state::VirtualState,
    synod_types::{AggregateSignature, Address, Color, DevScheme, HashValue, RequestId},
    synod_vm::{NullFactory, ProcessorRegistry},
};

/// Committee-wide dev secret for the threshold scheme.
pub const SECRET: [u8; 32] = [11u8; 32];

/// Poll until `cond` holds or `timeout` passes.
pub fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    cond()
}

/// Reserve a loopback address by briefly binding port 0.
fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    format!("127.0.0.1:{}", addr.port())
}

/// An in-process committee of real nodes.
pub struct TestCluster {
    pub bootup: BootupData,
    pub ledger: Arc<MemLedger>,
    pub publisher: Publisher,
    stores: Vec<Arc<MemKvStore>>,
    nodes: Vec<Option<CommitteeNode>>,
    threshold: u16,
    request_counter: u8,
}

impl TestCluster {
    /// Boot `n` committee nodes with the given signature threshold.
    pub fn start(n: u16, threshold: u16) -> Self {
        let committee_nodes: Vec<String> = (0..n).map(|_| free_addr()).collect();
        let bootup = BootupData {
            address: Address::new([9u8; 20]),
            owner_address: Address::new([8u8; 20]),
            color: Color::new([7u8; 32]),
            committee_nodes,
            access_nodes: vec![],
        };

        let ledger = Arc::new(MemLedger::new());
        ledger.set_balances(
            bootup.address,
            Balances::new().with(bootup.color, 1_000_000),
        );
        let publisher = Publisher::new();

        let stores: Vec<Arc<MemKvStore>> = (0..n).map(|_| Arc::new(MemKvStore::new())).collect();
        let mut cluster = Self {
            bootup,
            ledger,
            publisher,
            stores,
            nodes: (0..n).map(|_| None).collect(),
            threshold,
            request_counter: 0,
        };
        for index in 0..n as usize {
            // write the descriptor the way a real node would find it
            save_bootup_data(
                &*cluster.stores[index],
                &cluster.publisher,
                &cluster.bootup,
            )
            .unwrap();
            cluster.nodes[index] = Some(cluster.boot_node(index));
        }
        cluster
    }

    fn boot_node(&self, index: usize) -> CommitteeNode {
        let bootup = load_bootup_data(&*self.stores[index], &self.bootup.address)
            .unwrap()
            .expect("descriptor saved at cluster start");
        CommitteeNode::start(
            NodeConfig::dev_default(&bootup.committee_nodes[index]),
            bootup,
            self.stores[index].clone(),
            Arc::new(DevScheme::new(index as u16, self.threshold, SECRET)),
            self.ledger.clone(),
            ProcessorRegistry::new(Arc::new(NullFactory)),
            self.publisher.clone(),
        )
        .expect("node boots")
    }

    /// Committee size.
    pub fn size(&self) -> u16 {
        self.bootup.size()
    }

    /// Indices of the nodes currently running.
    pub fn running(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_some())
            .collect()
    }

    pub fn node_metrics(&self, index: usize) -> Arc<SynodMetrics> {
        self.nodes[index]
            .as_ref()
            .expect("node is running")
            .metrics()
    }

    /// Dismiss one node, keeping its store for a later restart.
    pub fn stop_node(&mut self, index: usize) {
        if let Some(node) = self.nodes[index].take() {
            node.dismiss();
        }
    }

    /// Boot a stopped node again on its persisted store.
    pub fn restart_node(&mut self, index: usize) {
        assert!(self.nodes[index].is_none(), "node {index} still running");
        self.nodes[index] = Some(self.boot_node(index));
    }

    /// Confirm a ledger transaction carrying one request block.
    pub fn inject_request(&mut self, args: &[(&str, Vec<u8>)]) -> RequestId {
        self.request_counter += 1;
        let mut block = RequestBlock {
            code: 1,
            ..RequestBlock::default()
        };
        block.args.insert("tag".into(), vec![self.request_counter]);
        for (key, value) in args {
            block.args.insert(key.to_string(), value.clone());
        }

        let mut tx = AnchorTransaction::draft(
            self.bootup.address,
            self.bootup.color,
            0,
            HashValue::nil(),
            self.request_counter as i64,
        );
        tx.requests.push(block);
        let tx = tx.finalize(AggregateSignature {
            bytes: vec![self.request_counter; 32],
        });
        let id = RequestId::new(tx.tx_id, 0);
        self.ledger.inject(tx);
        id
    }

    /// All running nodes see every other running committee member alive.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let expected = self.running().len().saturating_sub(1);
        wait_until(
            || {
                self.running()
                    .iter()
                    .all(|&i| self.nodes[i].as_ref().unwrap().alive_peers() >= expected)
            },
            timeout,
        )
    }

    /// All running nodes reach `state_index`.
    pub fn wait_state_index(&self, state_index: u32, timeout: Duration) -> bool {
        wait_until(
            || {
                self.running().iter().all(|&i| {
                    self.node_metrics(i).snapshot().state_index >= state_index as i64
                })
            },
            timeout,
        )
    }

    /// The persisted virtual state of one node.
    pub fn committed_state(&self, index: usize) -> Option<VirtualState> {
        let bytes = self.stores[index]
            .get(&state_key(&self.bootup.address))
            .unwrap()?;
        Some(VirtualState::decode(&bytes).unwrap())
    }

    /// The committee index scheduled to lead out of `state` at rotation
    /// offset 0.
    pub fn scheduled_leader(&self, state: &VirtualState) -> u16 {
        let order = permutation(self.size(), &state.hash());
        leader_index(&order, state.state_index, 0)
    }

    pub fn dismiss(mut self) {
        for index in 0..self.nodes.len() {
            self.stop_node(index);
        }
    }
}
