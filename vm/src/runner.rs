//! Running one VM task on a worker thread.
//!
//! The operator guards the one-task-at-a-time discipline with its
//! `vm_task_running` flag; the runner only executes and reports. The
//! completion is posted to the operator's inbox so all operator state
//! mutations stay on its single event context.

use {
    crate::{
        processor::Processor,
        task::{VmCompletion, VmTaskInput},
    },
    log::debug,
    std::{sync::Arc, thread, time::Instant},
    synod_monitoring::SynodMetrics,
};

/// Run `input` against `processor` on a fresh worker thread and hand the
/// completion to `done` — typically a closure posting into the
/// operator's inbox.
pub fn spawn_task(
    processor: Arc<dyn Processor>,
    input: VmTaskInput,
    metrics: Arc<SynodMetrics>,
    done: impl FnOnce(VmCompletion) + Send + 'static,
) {
    metrics.vm_tasks_started.inc();
    thread::Builder::new()
        .name("synodVmTask".to_string())
        .spawn(move || {
            let leader_peer_index = input.leader_peer_index;
            let program_hash = input.program_hash;
            let started = Instant::now();

            let result = processor.run(&input);

            metrics
                .vm_task_time_ms
                .observe(started.elapsed().as_secs_f64() * 1_000.0);
            if result.is_err() {
                metrics.vm_tasks_failed.inc();
            }
            debug!(
                "vm task for leader {leader_peer_index} finished in {:?}",
                started.elapsed()
            );
            done(VmCompletion {
                leader_peer_index,
                program_hash,
                result,
            });
        })
        .expect("failed to spawn vm worker thread");
}
