//! The built-in echo processor.
//!
//! Used by tests and local clusters: each request's arguments become
//! state mutations verbatim, and every request leaves a `processed/…`
//! marker so its effects are observable even with empty arguments.
//! Deterministic by construction.

use {
    crate::{
        error::Result,
        processor::{Processor, ProcessorFactory},
        task::{seal_output, VmTaskInput, VmTaskOutput},
    },
    std::sync::Arc,
    synod_state::StateUpdate,
    synod_types::HashValue,
};

/// See the module doc.
pub struct NullProcessor;

impl Processor for NullProcessor {
    fn run(&self, input: &VmTaskInput) -> Result<VmTaskOutput> {
        let mut updates = Vec::with_capacity(input.requests.len());
        let mut messages = Vec::new();
        for (request_id, block) in &input.requests {
            let mut update = StateUpdate::new(*request_id);
            for (key, value) in &block.args {
                update.set(key, value.clone());
            }
            update.set(
                &format!("processed/{request_id}"),
                block.code.to_be_bytes().to_vec(),
            );
            if let Some(text) = block.args.get("say") {
                messages.push(String::from_utf8_lossy(text).into_owned());
            }
            updates.push(update);
        }
        let mut output = seal_output(input, updates)?;
        output.messages = messages;
        Ok(output)
    }
}

/// Factory returning a [`NullProcessor`] for every program hash.
pub struct NullFactory;

impl ProcessorFactory for NullFactory {
    fn load(&self, _program_hash: &HashValue) -> Result<Arc<dyn Processor>> {
        Ok(Arc::new(NullProcessor))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        synod_ledger::{Balances, RequestBlock},
        synod_registry::BootupData,
        synod_state::VirtualState,
        synod_types::{hash_data, Address, Color, RequestId},
    };

    fn input_with_request() -> VmTaskInput {
        let bootup = BootupData {
            address: Address::new([1u8; 20]),
            owner_address: Address::new([2u8; 20]),
            color: Color::new([3u8; 32]),
            committee_nodes: vec!["a:1".into(), "b:2".into()],
            access_nodes: vec![],
        };
        let mut block = RequestBlock::default();
        block.code = 7;
        block.args.insert("greeting".into(), b"hello".to_vec());

        VmTaskInput {
            address: bootup.address,
            color: bootup.color,
            program_hash: hash_data(b"program"),
            state: VirtualState::origin(&bootup),
            requests: vec![(RequestId::new(hash_data(b"tx"), 0), block)],
            timestamp: 100,
            balances: Balances::new(),
            reward_address: bootup.owner_address,
            leader_peer_index: 1,
        }
    }

    #[test]
    fn test_args_become_mutations() {
        let output = NullProcessor.run(&input_with_request()).unwrap();
        assert_eq!(output.batch.size(), 1);
        let update = &output.batch.updates[0];
        assert!(update
            .mutations
            .iter()
            .any(|(k, v)| k == "greeting" && v == b"hello"));
        assert!(update.mutations.iter().any(|(k, _)| k.starts_with("processed/")));
    }

    #[test]
    fn test_identical_inputs_identical_essence() {
        let a = NullProcessor.run(&input_with_request()).unwrap();
        let b = NullProcessor.run(&input_with_request()).unwrap();
        assert_eq!(a.essence_hash, b.essence_hash);
        assert_eq!(a.anchor_draft.state_hash, b.anchor_draft.state_hash);
    }

    #[test]
    fn test_say_argument_becomes_message() {
        let mut input = input_with_request();
        input.requests[0]
            .1
            .args
            .insert("say".into(), b"minted".to_vec());
        let output = NullProcessor.run(&input).unwrap();
        assert_eq!(output.messages, vec!["minted".to_string()]);
    }

    #[test]
    fn test_empty_request_list_produces_empty_batch() {
        let mut input = input_with_request();
        input.requests.clear();
        let output = NullProcessor.run(&input).unwrap();
        assert_eq!(output.batch.size(), 0);
        assert_eq!(output.batch.state_index, 1);
    }
}
