//! Error types for the VM layer.

use {synod_types::HashValue, thiserror::Error};

/// Errors surfaced by VM tasks and the processor registry.
#[derive(Debug, Error)]
pub enum VmError {
    /// No processor is loaded for the program hash.
    #[error("processor not loaded: {0}")]
    NotLoaded(HashValue),

    /// The loader could not produce a processor.
    #[error("processor load failed: {0}")]
    LoadFailed(String),

    /// The task input does not fit the state it runs against.
    #[error("bad task input: {0}")]
    BadInput(String),

    /// The program itself failed.
    #[error("program error: {0}")]
    ProgramFailed(String),
}

/// Convenience result type for VM operations.
pub type Result<T> = std::result::Result<T, VmError>;
