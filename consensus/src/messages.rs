//! Wire messages owned by the consensus operator.
//!
//! Payloads are bincode; the message-type byte routes them at the
//! committee dispatcher. The consensus layer owns types 16–18.

use {
    crate::error::{ConsensusError, Result},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    synod_ledger::Balances,
    synod_types::{hash_data, Address, HashValue, RequestId, SigShare},
};

/// Tell the leader which requests the sender has seen.
pub const MSG_NOTIFY_REQUESTS: u8 = 16;
/// Leader's order to process a batch.
pub const MSG_START_PROCESSING_BATCH: u8 = 17;
/// A follower's signature share over a computed result.
pub const MSG_SIGNED_HASH: u8 = 18;

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| ConsensusError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| ConsensusError::Codec(e.to_string()))
}

/// Hash identifying a proposed batch: the sorted request ids plus the
/// leader's timestamp. Every honest node computes the same value for the
/// same proposal.
pub fn batch_hash(request_ids: &[RequestId], timestamp: i64) -> HashValue {
    let mut sorted = request_ids.to_vec();
    sorted.sort();

    let mut bytes = Vec::with_capacity(sorted.len() * 34 + 8);
    for id in &sorted {
        bytes.extend_from_slice(id.tx_id.as_ref());
        bytes.extend_from_slice(&id.block_index.to_be_bytes());
    }
    bytes.extend_from_slice(&timestamp.to_be_bytes());
    hash_data(&bytes)
}

/// Sent to the current leader: "I have seen these requests at this state
/// index." The leader proposes a batch only from requests that enough
/// peers have notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReqMsg {
    pub state_index: u32,
    pub request_ids: Vec<RequestId>,
}

impl NotifyReqMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// The leader's processing order. Followers that hold every listed
/// request dispatch the identical VM task; anyone missing one aborts
/// silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartProcessingBatchMsg {
    pub state_index: u32,
    /// Requests in batch order.
    pub request_ids: Vec<RequestId>,
    /// Batch timestamp chosen by the leader, monotone per leader.
    pub timestamp: i64,
    /// Balances snapshot the task runs against.
    pub balances: Balances,
    /// Address collecting request rewards.
    pub reward_address: Address,
}

impl StartProcessingBatchMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// The batch hash this order identifies.
    pub fn batch_hash(&self) -> HashValue {
        batch_hash(&self.request_ids, self.timestamp)
    }
}

/// A follower's signature share over its locally computed essence hash,
/// addressed to the leader that ordered the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHashMsg {
    pub state_index: u32,
    /// Which proposal this share answers.
    pub batch_hash: HashValue,
    /// Essence hash the follower computed and signed.
    pub essence_hash: HashValue,
    pub sig_share: SigShare,
}

impl SignedHashMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}
