//! Error types for the peering layer.

use thiserror::Error;

/// Errors surfaced by the peering layer.
#[derive(Debug, Error)]
pub enum PeeringError {
    /// Malformed framing, an unexpected message before the handshake, or a
    /// handshake id mismatch. The connection is closed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// I/O-level failure. The connection is closed; the dialing side
    /// reconnects with backoff.
    #[error("transport error: {0}")]
    TransportTransient(#[from] std::io::Error),

    /// A message would not fit the frame limit even after chunking.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The peering id is not in the registry.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// The peer has no handshaken connection right now.
    #[error("peer not connected: {0}")]
    NotConnected(String),

    /// A sequenced send found no alive peer to deliver to.
    #[error("no alive peers")]
    NoAlivePeers,

    /// The inbound delivery channel is gone; the node is shutting down.
    #[error("inbound channel closed")]
    ChannelClosed,
}

/// Convenience result type for peering operations.
pub type Result<T> = std::result::Result<T, PeeringError>;
