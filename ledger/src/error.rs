//! Error types for the ledger client layer.

use thiserror::Error;

/// Errors surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger rejected a submitted transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The transaction is not ready for submission.
    #[error("transaction not finalized: {0}")]
    NotFinalized(String),

    /// The connection to the ledger node is gone.
    #[error("ledger connection lost")]
    Disconnected,
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
