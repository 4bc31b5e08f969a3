//! Synod Registry
//!
//! Persistence layer for the committee node:
//!
//! - [`KvStore`] — the contract the node expects from its backing
//!   key-value store, plus [`MemKvStore`], an in-memory implementation
//!   used by tests and local clusters. The production store (RocksDB or
//!   similar) lives outside this workspace.
//! - [`BootupData`] — the persisted committee descriptor: contract
//!   address, owner address, token color, and the ordered committee and
//!   access node lists. Loaded once at boot; immutable at runtime.
//! - [`keys`] — object-type prefixed key layout shared by every record
//!   the node persists (descriptor, committed batches, virtual state).

pub mod bootup;
pub mod codec;
pub mod error;
pub mod keys;
pub mod kvstore;

pub use {
    bootup::{bootup_records, load_bootup_data, save_bootup_data, BootupData},
    error::{RegistryError, Result},
    keys::{batch_key, bootup_key, state_key, ObjectType},
    kvstore::{KvStore, MemKvStore},
};
