//! Synod VM Interface
//!
//! The deterministic virtual machine is an external collaborator; this
//! crate fixes the contract the committee node drives it through:
//!
//! - [`VmTaskInput`] / [`VmTaskOutput`] — the task boundary. Given the
//!   same `(state, requests, timestamp, balances)` every honest node must
//!   produce byte-identical output; the task must not consult the wall
//!   clock or any I/O.
//! - [`Processor`] — one loaded program, keyed by its program hash, with
//!   [`ProcessorRegistry`] handling presence checks and asynchronous
//!   loading through a [`ProcessorFactory`].
//! - [`runner`] — runs one task on a worker thread and posts the
//!   completion back to the operator's inbox. The operator enforces the
//!   one-task-at-a-time discipline; the runner just executes.
//! - [`NullProcessor`] — the built-in echo program used by tests and
//!   local clusters: each request's arguments become state mutations.

pub mod error;
pub mod null;
pub mod processor;
pub mod runner;
pub mod task;

pub use {
    error::{Result, VmError},
    null::{NullFactory, NullProcessor},
    processor::{Processor, ProcessorFactory, ProcessorRegistry},
    runner::spawn_task,
    task::{seal_output, VmCompletion, VmTaskInput, VmTaskOutput},
};
