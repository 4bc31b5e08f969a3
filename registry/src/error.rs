//! Error types for the registry layer.

use thiserror::Error;

/// Errors surfaced by registry operations.
///
/// Only the boot path propagates these to the caller; everything else in
/// the node logs and retries.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A persisted record failed to decode.
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// A record with the same key already exists.
    #[error("record already exists for address {0}")]
    AlreadyExists(String),

    /// The record being saved is invalid.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The requested record is not present.
    #[error("record not found")]
    NotFound,
}

/// Convenience result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
