//! The committee network adapter.
//!
//! Maps committee peer indices onto peer-registry entries and gives the
//! consensus operator and state manager their view of the network:
//! unicast, best-effort fan-out, sequenced sends, and liveness.

use {
    crate::{
        error::{PeeringError, Result},
        registry::PeerRegistry,
    },
    std::sync::Arc,
    synod_types::now_nanos,
};

/// Index-addressed sends over the peer registry for one committee.
pub struct CommitteeNet {
    registry: Arc<PeerRegistry>,
    committee_nodes: Vec<String>,
    own_index: u16,
}

impl CommitteeNet {
    /// Wire a committee onto the registry. Registers every committee and
    /// access node; `own_index` is the local node's position in the
    /// committee list.
    pub fn new(
        registry: Arc<PeerRegistry>,
        committee_nodes: Vec<String>,
        access_nodes: &[String],
        own_index: u16,
    ) -> Result<Self> {
        if own_index as usize >= committee_nodes.len() {
            return Err(PeeringError::UnknownPeer(format!(
                "own index {own_index} out of range"
            )));
        }
        if committee_nodes[own_index as usize] != registry.my_id() {
            return Err(PeeringError::UnknownPeer(format!(
                "own index {own_index} does not match listen address {}",
                registry.my_id()
            )));
        }
        for id in committee_nodes.iter().chain(access_nodes) {
            registry.add_peer(id);
        }
        Ok(Self {
            registry,
            committee_nodes,
            own_index,
        })
    }

    /// Committee size.
    pub fn size(&self) -> u16 {
        self.committee_nodes.len() as u16
    }

    /// The local node's committee index.
    pub fn own_index(&self) -> u16 {
        self.own_index
    }

    /// Peering id of a committee index.
    pub fn peering_id(&self, peer_index: u16) -> Option<&str> {
        self.committee_nodes
            .get(peer_index as usize)
            .map(|s| s.as_str())
    }

    /// Committee index of a peering id, if it is a committee member.
    pub fn index_of(&self, peering_id: &str) -> Option<u16> {
        self.committee_nodes
            .iter()
            .position(|id| id == peering_id)
            .map(|i| i as u16)
    }

    /// True iff the peer is connected and handshaken. The local node is
    /// never "alive" as a peer.
    pub fn is_alive(&self, peer_index: u16) -> bool {
        if peer_index == self.own_index {
            return false;
        }
        self.peering_id(peer_index)
            .and_then(|id| self.registry.peer(id))
            .map(|p| p.is_alive())
            .unwrap_or(false)
    }

    /// Number of alive committee peers.
    pub fn alive_peers(&self) -> u16 {
        (0..self.size()).filter(|&i| self.is_alive(i)).count() as u16
    }

    /// Unicast to one committee member. Errors if the index is unknown,
    /// local, or the peer is not currently alive.
    pub fn send(&self, peer_index: u16, msg_type: u8, data: &[u8]) -> Result<()> {
        if peer_index == self.own_index {
            return Err(PeeringError::UnknownPeer("own index".to_string()));
        }
        let id = self
            .peering_id(peer_index)
            .ok_or_else(|| PeeringError::UnknownPeer(format!("index {peer_index}")))?;
        if !self.is_alive(peer_index) {
            return Err(PeeringError::NotConnected(id.to_string()));
        }
        self.registry.send_to(id, msg_type, data)
    }

    /// Best-effort fan-out to every committee peer except self. Returns
    /// how many sends were queued and the shared send timestamp.
    pub fn broadcast(&self, msg_type: u8, data: &[u8]) -> (u16, i64) {
        let timestamp = now_nanos();
        let mut sent = 0u16;
        for (index, id) in self.committee_nodes.iter().enumerate() {
            if index as u16 == self.own_index {
                continue;
            }
            if !self.is_alive(index as u16) {
                continue;
            }
            if self.registry.send_to_at(id, msg_type, timestamp, data).is_ok() {
                sent += 1;
            }
        }
        (sent, timestamp)
    }

    /// Send to the first alive peer along `sequence`, starting at
    /// position `start` and wrapping. Skips self and dead peers. Returns
    /// the *position in the sequence* that was used, so a caller can
    /// resume at `pos + 1` on retry.
    pub fn send_in_sequence(
        &self,
        msg_type: u8,
        data: &[u8],
        start: u16,
        sequence: &[u16],
    ) -> Result<u16> {
        if sequence.is_empty() {
            return Err(PeeringError::NoAlivePeers);
        }
        for offset in 0..sequence.len() {
            let pos = (start as usize + offset) % sequence.len();
            let peer_index = sequence[pos];
            if peer_index == self.own_index || !self.is_alive(peer_index) {
                continue;
            }
            if self.send(peer_index, msg_type, data).is_ok() {
                return Ok(pos as u16);
            }
        }
        Err(PeeringError::NoAlivePeers)
    }
}
