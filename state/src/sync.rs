//! Catch-up: fetching missed batches from peers.
//!
//! When the largest evidenced state index runs ahead of the local index,
//! the manager requests each missing batch from its peers, one
//! `GetBatchMsg` per index, walking the peer sequence so consecutive
//! attempts (and retries after a timeout) land on different peers.

use {
    crate::messages::{GetBatchMsg, MSG_GET_BATCH},
    log::{debug, warn},
    std::{
        collections::HashMap,
        time::{Duration, Instant},
    },
    synod_monitoring::SynodMetrics,
    synod_peering::CommitteeNet,
};

struct PendingFetch {
    /// Position in the peer sequence to resume from on retry.
    next_pos: u16,
    sent_at: Instant,
    attempts: u32,
}

/// Tracks in-flight `GetBatch` requests.
#[derive(Default)]
pub struct CatchUp {
    pending: HashMap<u32, PendingFetch>,
}

impl CatchUp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Forget a fetch whose batch arrived.
    pub fn complete(&mut self, state_index: u32) {
        self.pending.remove(&state_index);
    }

    /// Drop fetches at or below the committed index.
    pub fn prune_committed(&mut self, state_index: u32) {
        self.pending.retain(|&idx, _| idx > state_index);
    }

    /// Issue requests for every missing index in `(current, target]` that
    /// is neither pending nor already held, and retry requests that have
    /// been waiting longer than `retry`. `sequence` is the hash-seeded
    /// committee permutation of the current state, so nodes spread their
    /// requests instead of piling onto peer 0.
    pub fn tick(
        &mut self,
        net: &CommitteeNet,
        sequence: &[u16],
        current: u32,
        target: u32,
        have_batch: impl Fn(u32) -> bool,
        retry: Duration,
        metrics: &SynodMetrics,
    ) {
        if sequence.is_empty() {
            return;
        }
        for state_index in (current + 1)..=target {
            if have_batch(state_index) {
                continue;
            }
            match self.pending.get_mut(&state_index) {
                None => {
                    let start = (state_index as usize % sequence.len()) as u16;
                    if let Some(pos) = Self::request(net, state_index, start, sequence, metrics) {
                        self.pending.insert(
                            state_index,
                            PendingFetch {
                                next_pos: pos.wrapping_add(1) % sequence.len() as u16,
                                sent_at: Instant::now(),
                                attempts: 1,
                            },
                        );
                    }
                }
                Some(fetch) if fetch.sent_at.elapsed() >= retry => {
                    let start = fetch.next_pos;
                    if let Some(pos) = Self::request(net, state_index, start, sequence, metrics) {
                        fetch.next_pos = pos.wrapping_add(1) % sequence.len() as u16;
                        fetch.sent_at = Instant::now();
                        fetch.attempts += 1;
                        debug!(
                            "retrying batch {state_index} fetch (attempt {})",
                            fetch.attempts
                        );
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn request(
        net: &CommitteeNet,
        state_index: u32,
        start: u16,
        sequence: &[u16],
        metrics: &SynodMetrics,
    ) -> Option<u16> {
        let msg = GetBatchMsg { state_index };
        let data = match msg.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!("GetBatch encode failed: {e}");
                return None;
            }
        };
        match net.send_in_sequence(MSG_GET_BATCH, &data, start, sequence) {
            Ok(pos) => {
                metrics.catchup_requests.inc();
                debug!("requested batch {state_index} from sequence position {pos}");
                Some(pos)
            }
            Err(e) => {
                debug!("no peer available for batch {state_index}: {e}");
                None
            }
        }
    }
}
