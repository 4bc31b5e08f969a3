//! The request backlog.
//!
//! Requests live here from validation until their effects appear in a
//! committed batch. Each entry tracks which committee peers have
//! notified the local node that they, too, hold the request — the
//! leader only proposes requests enough peers can actually process.

use {
    log::debug,
    std::collections::{HashMap, HashSet},
    synod_ledger::RequestBlock,
    synod_types::RequestId,
};

/// One request waiting to be processed.
#[derive(Debug, Clone)]
pub struct BacklogEntry {
    pub id: RequestId,
    pub block: RequestBlock,
    /// Local arrival time, nanoseconds. Selection order is
    /// `(arrival, id)` ascending.
    pub arrival: i64,
    /// Committee peers that have notified us about this request.
    pub notified_by: HashSet<u16>,
}

/// The operator's request backlog.
#[derive(Default)]
pub struct Backlog {
    requests: HashMap<RequestId, BacklogEntry>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    pub fn get(&self, id: &RequestId) -> Option<&BacklogEntry> {
        self.requests.get(id)
    }

    /// Insert a validated request. Returns `false` if already present.
    pub fn insert(&mut self, id: RequestId, block: RequestBlock, arrival: i64) -> bool {
        if self.requests.contains_key(&id) {
            return false;
        }
        self.requests.insert(
            id,
            BacklogEntry {
                id,
                block,
                arrival,
                notified_by: HashSet::new(),
            },
        );
        true
    }

    /// Record that `sender` has seen each of `ids`. Unknown ids are
    /// ignored — the notification may race the request's own arrival.
    pub fn mark_notified(&mut self, sender: u16, ids: &[RequestId]) {
        for id in ids {
            if let Some(entry) = self.requests.get_mut(id) {
                entry.notified_by.insert(sender);
            }
        }
    }

    /// All request ids currently in the backlog.
    pub fn all_ids(&self) -> Vec<RequestId> {
        self.requests.keys().copied().collect()
    }

    /// Drop requests whose effects are committed. Returns how many were
    /// removed.
    pub fn remove_committed(&mut self, committed: &[RequestId]) -> usize {
        let before = self.requests.len();
        for id in committed {
            if self.requests.remove(id).is_some() {
                debug!("request {} committed, removed from backlog", id.short());
            }
        }
        before - self.requests.len()
    }

    /// Requests eligible for the next batch: seen by at least
    /// `min_notifications` other peers, in `(arrival, id)` order, at
    /// most `max` of them.
    pub fn select_ready(&self, min_notifications: usize, max: usize) -> Vec<RequestId> {
        let mut eligible: Vec<&BacklogEntry> = self
            .requests
            .values()
            .filter(|e| e.notified_by.len() >= min_notifications)
            .collect();
        eligible.sort_by_key(|e| (e.arrival, e.id));
        eligible.into_iter().take(max).map(|e| e.id).collect()
    }

    /// The peers that have notified us about *every* id in `ids` — the
    /// set a processing order can be sent to.
    pub fn peers_holding_all(&self, ids: &[RequestId], committee_size: u16) -> Vec<u16> {
        (0..committee_size)
            .filter(|peer| {
                ids.iter().all(|id| {
                    self.requests
                        .get(id)
                        .map(|e| e.notified_by.contains(peer))
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Look up all of `ids`; `None` if any is missing. Order preserved.
    pub fn collect_blocks(&self, ids: &[RequestId]) -> Option<Vec<(RequestId, RequestBlock)>> {
        ids.iter()
            .map(|id| self.requests.get(id).map(|e| (e.id, e.block.clone())))
            .collect()
    }
}
