//! Error types for the node boot path.
//!
//! Only booting surfaces errors; the running node logs and retries.

use thiserror::Error;

/// Errors surfaced while loading a committee node.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The committee descriptor is missing or invalid.
    #[error("registry error: {0}")]
    Registry(#[from] synod_registry::RegistryError),

    /// The peering stack failed to come up (e.g. the port is taken).
    #[error("peering error: {0}")]
    Peering(#[from] synod_peering::PeeringError),

    /// The persisted state failed to load.
    #[error("state error: {0}")]
    State(#[from] synod_state::StateError),

    /// The tokio runtime could not be built.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The local listen address is not in the committee list.
    #[error("local address {0} is not a committee member")]
    NotInCommittee(String),
}

/// Convenience result type for the boot path.
pub type Result<T> = std::result::Result<T, CoreError>;
