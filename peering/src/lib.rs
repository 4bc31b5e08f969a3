//! Synod Peering Layer
//!
//! Peer-to-peer plumbing for one committee node:
//!
//! - **Framed transport** — length-prefixed binary envelopes over TCP,
//!   with oversize payloads split by the [`chopper`] and reassembled per
//!   connection.
//! - **Handshake & heartbeat** — connections carry no application traffic
//!   until peering ids have been exchanged; silence beyond the heartbeat
//!   timeout closes the connection and the dialing side reconnects with
//!   exponential backoff.
//! - **Peer registry** — one [`Peer`] per configured peering id, holding
//!   at most one live connection in exactly one direction: the side with
//!   the lexicographically larger listen address dials, the other accepts.
//! - **Committee adapter** — [`CommitteeNet`] maps committee peer indices
//!   onto registry entries and exposes unicast, fan-out, and sequenced
//!   sends plus a liveness view to the consensus and state layers.
//!
//! ## Wire format
//!
//! ```text
//! msg    := u32_be length ‖ u8 msg_type ‖ i64_be timestamp ‖ payload[length-9]
//! chunk  := msg_type=MSG_CHUNK,
//!           payload = u16_be chunk_idx ‖ u16_be chunk_total ‖ u32_be logical_id ‖ bytes
//! ```
//!
//! Reserved `msg_type` values: `0 HANDSHAKE`, `1 HEARTBEAT`, `2 MSG_CHUNK`.
//! Application types start at 16 and are routed untouched to the committee
//! dispatcher.

pub mod chopper;
pub mod committee;
pub mod config;
pub mod error;
pub mod message;
pub mod peer;
pub mod registry;

pub use {
    committee::CommitteeNet,
    config::PeeringConfig,
    error::{PeeringError, Result},
    message::{
        Envelope, FIRST_APP_MSG_TYPE, MAX_MESSAGE_SIZE, MSG_TYPE_CHUNK, MSG_TYPE_HANDSHAKE,
        MSG_TYPE_HEARTBEAT,
    },
    peer::Peer,
    registry::{InboundMessage, PeerRegistry},
};
