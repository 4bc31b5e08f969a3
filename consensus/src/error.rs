//! Error types for the consensus operator.

use thiserror::Error;

/// Errors surfaced by consensus operations.
///
/// The operator never propagates these outward; handlers log and drop.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// An event's state index does not match the current state.
    #[error("out of context: event for state index {event}, current {current}")]
    OutOfContext { event: u32, current: u32 },

    /// A request block failed validation.
    #[error("request validation failed: {0}")]
    ValidationFailed(String),

    /// The operator is not ready to act (no state, processor loading,
    /// balances stale).
    #[error("not ready: {0}")]
    NotReady(&'static str),

    /// A message failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Convenience result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
