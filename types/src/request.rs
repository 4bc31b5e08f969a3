//! Request identifiers.

use {
    crate::hash::HashValue,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Identifies one request block inside a ledger transaction.
///
/// Ordering is `(tx_id, block_index)` lexicographic, which gives every
/// honest node the same sort order when sealing a batch.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RequestId {
    /// Id of the ledger transaction carrying the request block.
    pub tx_id: HashValue,
    /// Index of the request block within that transaction.
    pub block_index: u16,
}

impl RequestId {
    pub fn new(tx_id: HashValue, block_index: u16) -> Self {
        Self { tx_id, block_index }
    }

    /// Short form for logging.
    pub fn short(&self) -> String {
        format!("{}[{}]", self.tx_id.short(), self.block_index)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.tx_id, self.block_index)
    }
}
