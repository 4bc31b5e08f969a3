//! Batches and state updates.

use {
    crate::error::{Result, StateError},
    serde::{Deserialize, Serialize},
    synod_types::{hash_chunks, HashValue, RequestId},
};

/// The effects of one processed request: an ordered list of variable
/// mutations. An empty value deletes the variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// The request whose execution produced this update.
    pub request_id: RequestId,
    /// Ordered `(key, value)` mutations.
    pub mutations: Vec<(String, Vec<u8>)>,
}

impl StateUpdate {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            mutations: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>) {
        self.mutations.push((key.to_string(), value));
    }

    /// Digest over the update's canonical encoding.
    pub fn digest(&self) -> HashValue {
        let bytes = bincode::serialize(self).expect("state update serialization is infallible");
        synod_types::hash_data(&bytes)
    }
}

/// One consensus round's ordered set of state updates.
///
/// A batch is *pending* until its anchor transaction is confirmed on the
/// ledger, then *committed*, advancing the virtual state to `state_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Index of the state this batch produces (parent index + 1).
    pub state_index: u32,
    /// Batch timestamp chosen by the leader, nanoseconds.
    pub timestamp: i64,
    /// Essence hash of the anchor transaction sealing this batch.
    pub essence_hash: HashValue,
    /// One update per processed request, in processing order.
    pub updates: Vec<StateUpdate>,
}

impl Batch {
    /// Number of updates.
    pub fn size(&self) -> u16 {
        self.updates.len() as u16
    }

    /// Ids of the requests processed in this batch.
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.updates.iter().map(|u| u.request_id).collect()
    }

    /// True iff the batch contains an update for `request_id`.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.updates.iter().any(|u| u.request_id == *request_id)
    }

    /// Chained digest over all updates. A receiver accepts a reassembled
    /// batch only when this matches the announced header.
    pub fn updates_digest(&self) -> HashValue {
        let mut acc = HashValue::nil();
        for update in &self.updates {
            acc = hash_chunks(&[acc.as_ref(), update.digest().as_ref()]);
        }
        acc
    }

    /// Encode for persistence or the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StateError::Encode(e.to_string()))
    }

    /// Decode a persisted or received batch.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| StateError::Decode(e.to_string()))
    }
}
