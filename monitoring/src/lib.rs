//! # Synod Monitoring
//!
//! Observability for the committee node, in two parts:
//!
//! - A process-local **telemetry bus** ([`Publisher`]) carrying named
//!   string-field events. Events emitted by the node: `bootuprec` (a
//!   committee record was saved), `request_in` (a new request entered the
//!   backlog), `vmready` (a VM processor finished loading), `vmmsg`
//!   (a message published from inside a VM run).
//! - **Metrics** with Prometheus conventions:
//!   - **Counter**: monotonically increasing value (e.g., batches committed)
//!   - **Gauge**: value that can go up or down (e.g., alive peers)
//!   - **Histogram**: distribution of observations (e.g., VM task times)
//!
//! ## Usage
//!
//! ```rust
//! use synod_monitoring::{Publisher, SynodMetrics};
//!
//! let publisher = Publisher::new();
//! let events = publisher.subscribe();
//! publisher.publish("vmready", &["6fffa0.."]);
//! assert_eq!(events.recv().unwrap().name, "vmready");
//!
//! let metrics = SynodMetrics::new();
//! metrics.batches_committed.inc();
//! metrics.peers_alive.set(3);
//! metrics.vm_task_time_ms.observe(12.0);
//!
//! let text = synod_monitoring::prometheus::encode(&metrics.snapshot());
//! ```

pub mod prometheus;

use {
    crossbeam_channel::{unbounded, Receiver, Sender},
    log::trace,
    parking_lot::Mutex,
    std::sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

// ---------------------------------------------------------------------------
// Telemetry bus
// ---------------------------------------------------------------------------

/// A single published telemetry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    /// Event name, e.g. `"request_in"`.
    pub name: &'static str,
    /// String payload fields, event defined.
    pub fields: Vec<String>,
}

/// Process-local pub/sub bus for telemetry events.
///
/// Cloning is cheap; all clones publish to the same subscriber set.
/// Publishing never blocks: subscribers sit behind unbounded channels and
/// disconnected subscribers are pruned on the next publish.
#[derive(Clone, Default)]
pub struct Publisher {
    subscribers: Arc<Mutex<Vec<Sender<TelemetryEvent>>>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a named event to all current subscribers.
    pub fn publish(&self, name: &'static str, fields: &[&str]) {
        trace!("publish {name}: {fields:?}");
        let event = TelemetryEvent {
            name,
            fields: fields.iter().map(|s| s.to_string()).collect(),
        };
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> Receiver<TelemetryEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Metric primitives
// ---------------------------------------------------------------------------

/// A monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a value to the counter.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current counter value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name,
            help,
        }
    }

    /// Set the gauge to an absolute value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Increment the gauge by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the gauge by 1.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get the current gauge value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram that collects observations into configurable buckets.
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: Mutex<f64>,
    count: AtomicU64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds.
    pub fn new(name: &'static str, help: &'static str, buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Observe a value, adding it to the appropriate bucket(s).
    pub fn observe(&self, v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        {
            let mut sum = self.sum.lock();
            *sum += v;
        }
        for (i, bound) in self.buckets.iter().enumerate() {
            if v <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the total number of observations.
    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of all observations.
    pub fn get_sum(&self) -> f64 {
        *self.sum.lock()
    }

    /// Get bucket counts.
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(self.counts.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Default buckets for timing histograms (milliseconds).
pub fn default_time_buckets() -> Vec<f64> {
    vec![
        1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
    ]
}

// ---------------------------------------------------------------------------
// Synod metrics
// ---------------------------------------------------------------------------

/// Complete metrics collection for one committee node.
pub struct SynodMetrics {
    // -- Peering --
    pub messages_sent: Counter,
    pub messages_received: Counter,
    pub messages_dropped: Counter,
    pub peers_alive: Gauge,

    // -- State --
    pub state_index: Gauge,
    pub batches_committed: Counter,
    pub catchup_requests: Counter,

    // -- Consensus --
    pub backlog_size: Gauge,
    pub leader_rotations: Counter,
    pub anchors_submitted: Counter,

    // -- VM --
    pub vm_tasks_started: Counter,
    pub vm_tasks_failed: Counter,
    pub vm_task_time_ms: Histogram,
}

impl SynodMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            messages_sent: Counter::new(
                "synod_messages_sent_total",
                "Peer messages queued for sending",
            ),
            messages_received: Counter::new(
                "synod_messages_received_total",
                "Peer messages received and dispatched",
            ),
            messages_dropped: Counter::new(
                "synod_messages_dropped_total",
                "Peer messages dropped on a full send queue",
            ),
            peers_alive: Gauge::new(
                "synod_peers_alive",
                "Committee peers currently connected and handshaken",
            ),
            state_index: Gauge::new(
                "synod_state_index",
                "Index of the last committed virtual state",
            ),
            batches_committed: Counter::new(
                "synod_batches_committed_total",
                "Batches applied to the virtual state",
            ),
            catchup_requests: Counter::new(
                "synod_catchup_requests_total",
                "GetBatch requests issued during catch-up",
            ),
            backlog_size: Gauge::new(
                "synod_backlog_size",
                "Requests currently in the operator backlog",
            ),
            leader_rotations: Counter::new(
                "synod_leader_rotations_total",
                "Leader rotations forced by a missed deadline",
            ),
            anchors_submitted: Counter::new(
                "synod_anchors_submitted_total",
                "Anchor transactions submitted to the ledger",
            ),
            vm_tasks_started: Counter::new(
                "synod_vm_tasks_started_total",
                "VM tasks dispatched to the worker",
            ),
            vm_tasks_failed: Counter::new(
                "synod_vm_tasks_failed_total",
                "VM tasks that completed with an error",
            ),
            vm_task_time_ms: Histogram::new(
                "synod_vm_task_time_ms",
                "VM task run time in milliseconds",
                default_time_buckets(),
            ),
        }
    }

    /// Take a full snapshot of all metrics for export.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.get(),
            messages_received: self.messages_received.get(),
            messages_dropped: self.messages_dropped.get(),
            peers_alive: self.peers_alive.get(),
            state_index: self.state_index.get(),
            batches_committed: self.batches_committed.get(),
            catchup_requests: self.catchup_requests.get(),
            backlog_size: self.backlog_size.get(),
            leader_rotations: self.leader_rotations.get(),
            anchors_submitted: self.anchors_submitted.get(),
            vm_tasks_started: self.vm_tasks_started.get(),
            vm_tasks_failed: self.vm_tasks_failed.get(),
            vm_task_time_count: self.vm_task_time_ms.get_count(),
            vm_task_time_sum: self.vm_task_time_ms.get_sum(),
            vm_task_time_buckets: self.vm_task_time_ms.get_buckets(),
        }
    }
}

impl Default for SynodMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of all node metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub peers_alive: i64,
    pub state_index: i64,
    pub batches_committed: u64,
    pub catchup_requests: u64,
    pub backlog_size: i64,
    pub leader_rotations: u64,
    pub anchors_submitted: u64,
    pub vm_tasks_started: u64,
    pub vm_tasks_failed: u64,
    pub vm_task_time_count: u64,
    pub vm_task_time_sum: f64,
    pub vm_task_time_buckets: Vec<(f64, u64)>,
}
