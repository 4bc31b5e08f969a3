//! Synod Shared Domain Types
//!
//! Foundation types used across every crate of the committee node:
//!
//! - [`HashValue`] — 32-byte SHA-256 digest used for state hashes, batch
//!   hashes, essence hashes, and transaction ids.
//! - [`Address`] — 20-byte contract / account address.
//! - [`Color`] — 32-byte token color identifying the committee's token.
//! - [`RequestId`] — (transaction id, request block index) pair.
//! - [`permutation`] — hash-seeded committee orderings shared by leader
//!   selection and catch-up.
//! - [`scheme`] — the threshold-signature contract the consensus operator
//!   aggregates against, plus a deterministic scheme for tests.
//!
//! The cryptographic primitives themselves (BLS-style threshold signatures,
//! ledger signature schemes) live outside this workspace; this crate only
//! fixes the shapes the node depends on.

pub mod address;
pub mod hash;
pub mod permutation;
pub mod request;
pub mod scheme;
pub mod time;

pub use address::{Address, Color, ADDRESS_LEN, COLOR_LEN};
pub use hash::{hash_chunks, hash_data, HashValue, HASH_LEN};
pub use permutation::permutation;
pub use request::RequestId;
pub use scheme::{AggregateSignature, DevScheme, SchemeError, SigShare, ThresholdScheme};
pub use time::now_nanos;
