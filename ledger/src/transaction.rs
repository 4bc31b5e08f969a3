//! Anchor transactions, request blocks, and balances.

use {
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
    synod_types::{hash_data, AggregateSignature, Address, Color, HashValue, RequestId},
};

/// Colored-token balances backing a contract address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Amount per token color.
    pub by_color: BTreeMap<Color, u64>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, color: Color, amount: u64) -> Self {
        self.by_color.insert(color, amount);
        self
    }

    /// Balance for one color, zero if absent.
    pub fn of(&self, color: &Color) -> u64 {
        self.by_color.get(color).copied().unwrap_or(0)
    }

    /// Total across all colors.
    pub fn total(&self) -> u64 {
        self.by_color.values().sum()
    }
}

/// One request block inside a ledger transaction, addressed to a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBlock {
    /// Request code selecting the entry point in the contract program.
    pub code: u16,
    /// Typed arguments, key to raw value.
    pub args: BTreeMap<String, Vec<u8>>,
    /// Reward attached for the committee, in base tokens.
    pub reward: u64,
}

/// The unsigned portion of an anchor transaction, hashed into the essence.
#[derive(Serialize)]
struct Essence<'a> {
    address: &'a Address,
    color: &'a Color,
    state_index: u32,
    state_hash: &'a HashValue,
    timestamp: i64,
    requests: &'a [RequestBlock],
}

/// A value-ledger transaction involving the committee's address.
///
/// Two roles share this shape: state anchors produced by the committee
/// (output encodes the new state hash) and inbound transactions carrying
/// request blocks addressed to the contract. A transaction is a *draft*
/// until an aggregate signature is attached; only finalized transactions
/// can be submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorTransaction {
    /// Transaction id. Zero for drafts; set at finalization.
    pub tx_id: HashValue,
    /// Contract address this transaction involves.
    pub address: Address,
    /// Committee token color.
    pub color: Color,
    /// State index the anchored batch produces.
    pub state_index: u32,
    /// Hash of the virtual state after applying the batch.
    pub state_hash: HashValue,
    /// Timestamp of the anchored batch, nanoseconds.
    pub timestamp: i64,
    /// Request blocks carried by this transaction.
    pub requests: Vec<RequestBlock>,
    /// Aggregate committee signature over the essence. `None` for drafts.
    pub signature: Option<AggregateSignature>,
}

impl AnchorTransaction {
    /// Build an unsigned draft.
    pub fn draft(
        address: Address,
        color: Color,
        state_index: u32,
        state_hash: HashValue,
        timestamp: i64,
    ) -> Self {
        Self {
            tx_id: HashValue::nil(),
            address,
            color,
            state_index,
            state_hash,
            timestamp,
            requests: Vec::new(),
            signature: None,
        }
    }

    /// Hash of the unsigned portion — the object each committee member signs.
    pub fn essence_hash(&self) -> HashValue {
        let essence = Essence {
            address: &self.address,
            color: &self.color,
            state_index: self.state_index,
            state_hash: &self.state_hash,
            timestamp: self.timestamp,
            requests: &self.requests,
        };
        let bytes = bincode::serialize(&essence).expect("essence serialization is infallible");
        hash_data(&bytes)
    }

    /// Attach the aggregate signature and derive the transaction id.
    pub fn finalize(mut self, signature: AggregateSignature) -> Self {
        let essence = self.essence_hash();
        self.tx_id = synod_types::hash_chunks(&[essence.as_ref(), &signature.bytes]);
        self.signature = Some(signature);
        self
    }

    /// True once an aggregate signature is attached.
    pub fn is_finalized(&self) -> bool {
        self.signature.is_some()
    }

    /// Ids of the request blocks carried by this transaction.
    pub fn request_ids(&self) -> Vec<RequestId> {
        (0..self.requests.len())
            .map(|i| RequestId::new(self.tx_id, i as u16))
            .collect()
    }
}
