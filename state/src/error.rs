//! Error types for the state layer.

use thiserror::Error;

/// Errors surfaced by state operations.
///
/// The state manager never propagates these outward; it logs and retries.
/// Only [`StateError::Fatal`] halts the committee operator.
#[derive(Debug, Error)]
pub enum StateError {
    /// A batch does not chain onto the current state.
    #[error("batch out of sequence: batch {batch_index}, state {state_index}")]
    OutOfSequence { batch_index: u32, state_index: u32 },

    /// An encoded batch or state blob failed to decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message failed to encode.
    #[error("encode error: {0}")]
    Encode(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] synod_registry::RegistryError),

    /// Corrupted persisted data or an impossible invariant violation.
    /// The committee operator halts; the process does not crash.
    #[error("fatal state error: {0}")]
    Fatal(String),
}

/// Convenience result type for state operations.
pub type Result<T> = std::result::Result<T, StateError>;
