//! Key layout for persisted records.
//!
//! Every key is an object-type byte followed by the contract address,
//! plus record-specific suffixes. Integers in keys are big-endian so that
//! lexicographic key order equals numeric order.

use synod_types::Address;

/// Object-type prefix of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    /// Committee descriptor.
    BootupData = 0x01,
    /// A committed batch, one record per state index.
    Batch = 0x02,
    /// The current virtual state.
    VirtualState = 0x03,
}

/// `0x01 ‖ address` — the committee descriptor record.
pub fn bootup_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + address.as_bytes().len());
    key.push(ObjectType::BootupData as u8);
    key.extend_from_slice(address.as_ref());
    key
}

/// `0x02 ‖ address ‖ state_index_be` — a committed batch blob.
pub fn batch_key(address: &Address, state_index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + address.as_bytes().len() + 4);
    key.push(ObjectType::Batch as u8);
    key.extend_from_slice(address.as_ref());
    key.extend_from_slice(&state_index.to_be_bytes());
    key
}

/// `0x03 ‖ address` — the current virtual state blob.
pub fn state_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + address.as_bytes().len());
    key.push(ObjectType::VirtualState as u8);
    key.extend_from_slice(address.as_ref());
    key
}
