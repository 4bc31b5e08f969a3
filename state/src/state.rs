//! The virtual state: a versioned variable snapshot.

use {
    crate::{
        batch::Batch,
        error::{Result, StateError},
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
    synod_registry::BootupData,
    synod_types::{hash_chunks, hash_data, Address, HashValue},
};

/// Variable holding the committee owner's address.
pub const VAR_OWNER_ADDRESS: &str = "owner_address";
/// Variable holding the committee size as u16 big-endian.
pub const VAR_COMMITTEE_SIZE: &str = "committee_size";
/// Variable holding the hash of the contract program.
pub const VAR_PROGRAM_HASH: &str = "program_hash";

/// The replicated contract state at one state index.
///
/// Owned exclusively by the state manager; the consensus operator only
/// ever sees value snapshots. The hash is a pure function of the origin
/// descriptor and the batches applied since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualState {
    /// Contract address this state belongs to.
    pub address: Address,
    /// Monotone counter of committed snapshots; 0 is the origin.
    pub state_index: u32,
    /// Timestamp of the batch that produced this state, 0 at origin.
    pub timestamp: i64,
    variables: BTreeMap<String, Vec<u8>>,
}

impl VirtualState {
    /// The deterministic origin state (index 0) for a committee.
    ///
    /// Seeds the owner address, the committee size, and the program hash
    /// (derived from the committee color, which identifies the origin
    /// transaction) so that every member computes the identical origin.
    pub fn origin(bootup: &BootupData) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert(
            VAR_OWNER_ADDRESS.to_string(),
            bootup.owner_address.as_ref().to_vec(),
        );
        variables.insert(
            VAR_COMMITTEE_SIZE.to_string(),
            bootup.size().to_be_bytes().to_vec(),
        );
        variables.insert(
            VAR_PROGRAM_HASH.to_string(),
            hash_data(bootup.color.as_ref()).as_ref().to_vec(),
        );
        Self {
            address: bootup.address,
            state_index: 0,
            timestamp: 0,
            variables,
        }
    }

    /// Read a variable.
    pub fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.variables.get(key)
    }

    /// The program hash recorded in the state, if any.
    pub fn program_hash(&self) -> Option<HashValue> {
        self.get(VAR_PROGRAM_HASH)
            .and_then(|bytes| HashValue::from_slice(bytes))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Hash of this state. Covers the address, the index, the timestamp,
    /// and every variable in key order.
    pub fn hash(&self) -> HashValue {
        let mut chunks: Vec<&[u8]> = Vec::with_capacity(3 + self.variables.len() * 2);
        let index_bytes = self.state_index.to_be_bytes();
        let ts_bytes = self.timestamp.to_be_bytes();
        chunks.push(self.address.as_ref());
        chunks.push(&index_bytes);
        chunks.push(&ts_bytes);
        for (key, value) in &self.variables {
            chunks.push(key.as_bytes());
            chunks.push(value);
        }
        hash_chunks(&chunks)
    }

    /// Apply a committed batch, advancing to its state index.
    ///
    /// The batch must chain directly onto this state. Mutations apply in
    /// order; an empty value deletes the variable.
    pub fn apply(&mut self, batch: &Batch) -> Result<()> {
        if batch.state_index != self.state_index + 1 {
            return Err(StateError::OutOfSequence {
                batch_index: batch.state_index,
                state_index: self.state_index,
            });
        }
        for update in &batch.updates {
            for (key, value) in &update.mutations {
                if value.is_empty() {
                    self.variables.remove(key);
                } else {
                    self.variables.insert(key.clone(), value.clone());
                }
            }
        }
        self.state_index = batch.state_index;
        self.timestamp = batch.timestamp;
        Ok(())
    }

    /// Encode for persistence.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StateError::Encode(e.to_string()))
    }

    /// Decode a persisted state.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| StateError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::batch::StateUpdate,
        synod_types::{Color, RequestId},
    };

    fn bootup() -> BootupData {
        BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec!["a:1".into(), "b:2".into(), "c:3".into(), "d:4".into()],
            access_nodes: vec![],
        }
    }

    fn batch_with(state_index: u32, key: &str, value: Vec<u8>) -> Batch {
        let mut update = StateUpdate::new(RequestId::new(hash_data(b"req"), 0));
        update.set(key, value);
        Batch {
            state_index,
            timestamp: 1_000,
            essence_hash: hash_data(b"essence"),
            updates: vec![update],
        }
    }

    #[test]
    fn test_origin_is_deterministic() {
        let a = VirtualState::origin(&bootup());
        let b = VirtualState::origin(&bootup());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.state_index, 0);
        assert!(a.program_hash().is_some());
        assert_eq!(
            a.get(VAR_COMMITTEE_SIZE).map(|v| v.as_slice()),
            Some(&4u16.to_be_bytes()[..])
        );
    }

    #[test]
    fn test_origin_differs_per_descriptor() {
        let mut other = bootup();
        other.color = Color::new([9u8; 32]);
        assert_ne!(
            VirtualState::origin(&bootup()).hash(),
            VirtualState::origin(&other).hash()
        );
    }

    #[test]
    fn test_apply_advances_index_and_hash() {
        let mut state = VirtualState::origin(&bootup());
        let origin_hash = state.hash();

        state.apply(&batch_with(1, "x", vec![7])).unwrap();
        assert_eq!(state.state_index, 1);
        assert_eq!(state.get("x"), Some(&vec![7]));
        assert_ne!(state.hash(), origin_hash);
    }

    #[test]
    fn test_apply_rejects_gap() {
        let mut state = VirtualState::origin(&bootup());
        assert!(matches!(
            state.apply(&batch_with(2, "x", vec![1])),
            Err(StateError::OutOfSequence { .. })
        ));
    }

    #[test]
    fn test_empty_value_deletes() {
        let mut state = VirtualState::origin(&bootup());
        state.apply(&batch_with(1, "x", vec![7])).unwrap();
        state.apply(&batch_with(2, "x", Vec::new())).unwrap();
        assert_eq!(state.get("x"), None);
    }

    #[test]
    fn test_same_batches_same_hash() {
        let mut a = VirtualState::origin(&bootup());
        let mut b = VirtualState::origin(&bootup());
        for i in 1..=3 {
            a.apply(&batch_with(i, "k", vec![i as u8])).unwrap();
            b.apply(&batch_with(i, "k", vec![i as u8])).unwrap();
        }
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut state = VirtualState::origin(&bootup());
        state.apply(&batch_with(1, "x", vec![1, 2, 3])).unwrap();
        let decoded = VirtualState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.hash(), state.hash());
    }
}
