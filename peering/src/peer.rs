//! Per-peer connection bookkeeping.

use {
    crate::error::{PeeringError, Result},
    log::debug,
    parking_lot::Mutex,
    std::sync::atomic::{AtomicU32, AtomicU64, Ordering},
    synod_types::now_nanos,
    tokio::sync::mpsc,
};

/// Classify a configured peer: a peer is *inbound* iff the local listen
/// address sorts lexicographically before the peer's id. Exactly one side
/// of every pair dials; the other accepts.
pub fn is_inbound(my_id: &str, peer_id: &str) -> bool {
    my_id < peer_id
}

struct ConnState {
    /// Send queue of the live connection, `None` when disconnected.
    sender: Option<mpsc::Sender<Vec<u8>>>,
    /// Generation counter guarding against stale cleanup after reconnects.
    conn_id: u64,
    handshake_ok: bool,
    last_heartbeat_sent: i64,
    last_heartbeat_received: i64,
}

/// One configured peer.
///
/// The peer owns its connection slot; connection tasks hold only the
/// generation id and clear the slot through [`Peer::clear_connection`]
/// when the connection dies. All connection state sits behind one mutex.
pub struct Peer {
    peering_id: String,
    inbound: bool,
    state: Mutex<ConnState>,
    next_logical_id: AtomicU32,
    dropped_sends: AtomicU64,
}

impl Peer {
    pub fn new(peering_id: String, inbound: bool) -> Self {
        Self {
            peering_id,
            inbound,
            state: Mutex::new(ConnState {
                sender: None,
                conn_id: 0,
                handshake_ok: false,
                last_heartbeat_sent: 0,
                last_heartbeat_received: 0,
            }),
            next_logical_id: AtomicU32::new(0),
            dropped_sends: AtomicU64::new(0),
        }
    }

    pub fn peering_id(&self) -> &str {
        &self.peering_id
    }

    /// True iff this peer dials us (we accept).
    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    /// True iff a connection is bound and the handshake completed.
    pub fn is_alive(&self) -> bool {
        let state = self.state.lock();
        state.sender.is_some() && state.handshake_ok
    }

    /// Messages dropped on a full send queue so far.
    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends.load(Ordering::Relaxed)
    }

    /// Next logical id for a chopped message on this peer's connection.
    pub fn next_logical_id(&self) -> u32 {
        self.next_logical_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind a fresh, handshaken connection. Fails if one is already bound
    /// — at most one connection per peering id.
    pub fn bind_connection(&self, sender: mpsc::Sender<Vec<u8>>, conn_id: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.sender.is_some() {
            return Err(PeeringError::ProtocolViolation(format!(
                "peer {} already has a connection",
                self.peering_id
            )));
        }
        state.sender = Some(sender);
        state.conn_id = conn_id;
        state.handshake_ok = true;
        state.last_heartbeat_received = now_nanos();
        state.last_heartbeat_sent = 0;
        Ok(())
    }

    /// Drop whatever connection is bound, regardless of generation.
    /// Used on committee dismissal.
    pub fn force_clear(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.handshake_ok = false;
    }

    /// Clear the connection slot if it still belongs to `conn_id`.
    pub fn clear_connection(&self, conn_id: u64) {
        let mut state = self.state.lock();
        if state.conn_id == conn_id && state.sender.is_some() {
            state.sender = None;
            state.handshake_ok = false;
            debug!("peer {} disconnected", self.peering_id);
        }
    }

    /// Any received message counts as a heartbeat.
    pub fn note_received(&self) {
        self.state.lock().last_heartbeat_received = now_nanos();
    }

    pub fn note_heartbeat_sent(&self) {
        self.state.lock().last_heartbeat_sent = now_nanos();
    }

    /// Wall-clock nanoseconds of the last received message, 0 if never.
    pub fn last_received(&self) -> i64 {
        self.state.lock().last_heartbeat_received
    }

    /// Queue an encoded frame without blocking.
    ///
    /// A full queue drops the frame and counts it — retransmission is the
    /// sender's responsibility on its next timer tick. Returns `Ok(true)`
    /// if queued, `Ok(false)` if dropped.
    pub fn try_send_frame(&self, frame: Vec<u8>) -> Result<bool> {
        let state = self.state.lock();
        let sender = match (&state.sender, state.handshake_ok) {
            (Some(sender), true) => sender,
            _ => return Err(PeeringError::NotConnected(self.peering_id.clone())),
        };
        match sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_sends.fetch_add(1, Ordering::Relaxed);
                debug!("send queue full for {}, message dropped", self.peering_id);
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PeeringError::NotConnected(self.peering_id.clone()))
            }
        }
    }
}
