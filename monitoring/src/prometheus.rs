//! Prometheus text format exporter for Synod metrics.
//!
//! Encodes a [`MetricsSnapshot`] into the [Prometheus exposition format](https://prometheus.io/docs/instrumenting/exposition_formats/)
//! (text/plain; version=0.0.4).
//!
//! ## Usage
//!
//! ```rust
//! use synod_monitoring::{SynodMetrics, prometheus};
//!
//! let metrics = SynodMetrics::new();
//! metrics.batches_committed.add(8);
//! metrics.peers_alive.set(3);
//!
//! let snapshot = metrics.snapshot();
//! let text = prometheus::encode(&snapshot);
//! // Serve `text` on /metrics endpoint
//! ```

use crate::MetricsSnapshot;

/// Encode a metrics snapshot into Prometheus text exposition format.
pub fn encode(snap: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(2048);

    // -----------------------------------------------------------------------
    // Peering
    // -----------------------------------------------------------------------
    write_counter(&mut out, "synod_messages_sent_total",
        "Peer messages queued for sending",
        snap.messages_sent);

    write_counter(&mut out, "synod_messages_received_total",
        "Peer messages received and dispatched",
        snap.messages_received);

    write_counter(&mut out, "synod_messages_dropped_total",
        "Peer messages dropped on a full send queue",
        snap.messages_dropped);

    write_gauge(&mut out, "synod_peers_alive",
        "Committee peers currently connected and handshaken",
        snap.peers_alive);

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------
    write_gauge(&mut out, "synod_state_index",
        "Index of the last committed virtual state",
        snap.state_index);

    write_counter(&mut out, "synod_batches_committed_total",
        "Batches applied to the virtual state",
        snap.batches_committed);

    write_counter(&mut out, "synod_catchup_requests_total",
        "GetBatch requests issued during catch-up",
        snap.catchup_requests);

    // -----------------------------------------------------------------------
    // Consensus
    // -----------------------------------------------------------------------
    write_gauge(&mut out, "synod_backlog_size",
        "Requests currently in the operator backlog",
        snap.backlog_size);

    write_counter(&mut out, "synod_leader_rotations_total",
        "Leader rotations forced by a missed deadline",
        snap.leader_rotations);

    write_counter(&mut out, "synod_anchors_submitted_total",
        "Anchor transactions submitted to the ledger",
        snap.anchors_submitted);

    // -----------------------------------------------------------------------
    // VM
    // -----------------------------------------------------------------------
    write_counter(&mut out, "synod_vm_tasks_started_total",
        "VM tasks dispatched to the worker",
        snap.vm_tasks_started);

    write_counter(&mut out, "synod_vm_tasks_failed_total",
        "VM tasks that completed with an error",
        snap.vm_tasks_failed);

    write_histogram(&mut out, "synod_vm_task_time_ms",
        "VM task run time in milliseconds",
        &snap.vm_task_time_buckets, snap.vm_task_time_sum, snap.vm_task_time_count);

    out
}

// ---------------------------------------------------------------------------
// Helper writers
// ---------------------------------------------------------------------------

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: i64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n\n"));
}

fn write_histogram(
    out: &mut String,
    name: &str,
    help: &str,
    buckets: &[(f64, u64)],
    sum: f64,
    count: u64,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} histogram\n"));

    for (bound, cumulative_count) in buckets {
        out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {cumulative_count}\n"));
    }
    // Always include +Inf bucket
    out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {count}\n"));
    out.push_str(&format!("{name}_sum {sum}\n"));
    out.push_str(&format!("{name}_count {count}\n\n"));
}
