//! Wire messages owned by the state manager.
//!
//! Payloads are bincode; the message-type byte routes them at the
//! committee dispatcher. The state layer owns types 19–22.

use {
    crate::{
        batch::StateUpdate,
        error::{Result, StateError},
    },
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    synod_ledger::AnchorTransaction,
    synod_types::HashValue,
};

/// Request one committed batch from a peer.
pub const MSG_GET_BATCH: u8 = 19;
/// Announce a batch: header first, then its updates.
pub const MSG_BATCH_HEADER: u8 = 20;
/// One state update of an announced batch.
pub const MSG_STATE_UPDATE: u8 = 21;
/// A peer's claim of its committed state index.
pub const MSG_STATE_INDEX_EVIDENCE: u8 = 22;

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| StateError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| StateError::Decode(e.to_string()))
}

/// Ask a peer for the batch producing `state_index`. Answered with a
/// [`BatchHeaderMsg`] plus [`StateUpdateMsg`]s, or silently dropped if
/// the peer has not committed that far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBatchMsg {
    pub state_index: u32,
}

impl GetBatchMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// Opens a batch transfer. The receiver reassembles the following
/// [`StateUpdateMsg`]s keyed by `state_index` and accepts the batch once
/// all `size` updates are present and their chained digest matches
/// `updates_digest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchHeaderMsg {
    pub state_index: u32,
    /// Number of updates that follow.
    pub size: u16,
    /// Batch timestamp chosen by the leader.
    pub timestamp: i64,
    /// Essence hash of the sealing anchor transaction.
    pub essence_hash: HashValue,
    /// Chained digest over the updates, checked after reassembly.
    pub updates_digest: HashValue,
    /// The confirmed anchor, present when a committed batch is served
    /// during catch-up; `None` when a pending batch is rebroadcast.
    pub anchor: Option<AnchorTransaction>,
}

impl BatchHeaderMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// One update of a batch transfer, `seq` in `0..size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdateMsg {
    pub state_index: u32,
    pub seq: u16,
    pub update: StateUpdate,
}

impl StateUpdateMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// Periodic claim of the sender's committed state index. Peers that have
/// fallen behind use the largest evidenced index as their catch-up target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMsg {
    pub state_index: u32,
}

impl EvidenceMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        synod_types::{hash_data, RequestId},
    };

    #[test]
    fn test_header_roundtrip() {
        let msg = BatchHeaderMsg {
            state_index: 5,
            size: 2,
            timestamp: 77,
            essence_hash: hash_data(b"essence"),
            updates_digest: hash_data(b"digest"),
            anchor: None,
        };
        assert_eq!(BatchHeaderMsg::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_update_roundtrip() {
        let mut update = StateUpdate::new(RequestId::new(hash_data(b"r"), 1));
        update.set("k", vec![1, 2]);
        let msg = StateUpdateMsg {
            state_index: 5,
            seq: 0,
            update,
        };
        assert_eq!(StateUpdateMsg::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(GetBatchMsg::decode(b"nonsense").is_err());
        assert!(BatchHeaderMsg::decode(&[]).is_err());
    }
}
