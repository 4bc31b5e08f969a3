//! The peer registry: connection lifecycle for every configured peer.
//!
//! The registry owns the single TCP listener and one background dial loop
//! per outbound peer. Inbound connections start *detached*: the first
//! frame must be a `HANDSHAKE` carrying the dialer's peering id, which is
//! looked up in the registry and bound only if the peer is classified
//! inbound. Outbound connections send a `HANDSHAKE` carrying the remote
//! id and verify the echoed reply.
//!
//! Decoded application messages are pushed onto a crossbeam channel; the
//! committee dispatcher drains it on its own thread. Sends never block:
//! frames are queued onto the connection's bounded send queue and dropped
//! (and counted) when it is full.

use {
    crate::{
        chopper::{self, Reassembler},
        config::PeeringConfig,
        error::{PeeringError, Result},
        message::{
            read_frame, Envelope, ENVELOPE_HEADER_LEN, MAX_FRAME_BODY, MSG_TYPE_CHUNK,
            MSG_TYPE_HANDSHAKE, MSG_TYPE_HEARTBEAT,
        },
        peer::{is_inbound, Peer},
    },
    crossbeam_channel::Sender,
    log::{debug, error, info, warn},
    parking_lot::RwLock,
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc,
        },
    },
    synod_monitoring::SynodMetrics,
    synod_types::now_nanos,
    tokio::{
        io::AsyncWriteExt,
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpListener, TcpStream,
        },
        sync::{mpsc, Notify},
        time::{interval, sleep, timeout},
    },
};

/// A decoded application message together with the sender's peering id.
#[derive(Debug)]
pub struct InboundMessage {
    /// Peering id of the connection the message arrived on.
    pub from_id: String,
    /// The decoded envelope (application msg types only).
    pub envelope: Envelope,
}

/// Directory of configured peers and owner of their connections.
pub struct PeerRegistry {
    config: PeeringConfig,
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    inbound_tx: Sender<InboundMessage>,
    metrics: Arc<SynodMetrics>,
    conn_counter: AtomicU64,
    is_shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl PeerRegistry {
    pub fn new(
        config: PeeringConfig,
        inbound_tx: Sender<InboundMessage>,
        metrics: Arc<SynodMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            peers: RwLock::new(HashMap::new()),
            inbound_tx,
            metrics,
            conn_counter: AtomicU64::new(1),
            is_shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    /// The local peering id (listen address).
    pub fn my_id(&self) -> &str {
        &self.config.listen_addr
    }

    /// Register a configured peer. The local id itself is skipped.
    pub fn add_peer(&self, peering_id: &str) {
        if peering_id == self.my_id() {
            return;
        }
        let inbound = is_inbound(self.my_id(), peering_id);
        self.peers
            .write()
            .entry(peering_id.to_string())
            .or_insert_with(|| {
                debug!(
                    "registered peer {peering_id} ({})",
                    if inbound { "inbound" } else { "outbound" }
                );
                Arc::new(Peer::new(peering_id.to_string(), inbound))
            });
    }

    /// Look up a peer by id.
    pub fn peer(&self, peering_id: &str) -> Option<Arc<Peer>> {
        self.peers.read().get(peering_id).cloned()
    }

    /// Number of peers currently alive (connected and handshaken).
    pub fn alive_count(&self) -> usize {
        self.peers.read().values().filter(|p| p.is_alive()).count()
    }

    /// Bind the listener and spawn the accept loop plus one dial loop per
    /// outbound peer. Boot errors (e.g. the port is taken) surface here.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.my_id()).await?;
        info!("peering listener on {}", self.my_id());

        let registry = self.clone();
        tokio::spawn(async move { registry.accept_loop(listener).await });

        let outbound: Vec<Arc<Peer>> = self
            .peers
            .read()
            .values()
            .filter(|p| !p.is_inbound())
            .cloned()
            .collect();
        for peer in outbound {
            let registry = self.clone();
            tokio::spawn(async move { registry.dial_loop(peer).await });
        }
        Ok(())
    }

    /// Stop accepting, stop dialing, and drop every live connection.
    /// Dropping a connection's send queue ends its write loop; the read
    /// loop ends when the socket closes.
    pub fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
        for peer in self.peers.read().values() {
            peer.force_clear();
        }
        self.refresh_alive_gauge();
    }

    fn shutting_down(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    // ── Sending ─────────────────────────────────────────────────────────

    /// Encode and queue a message for `peering_id`, chopping if oversize.
    pub fn send_to(&self, peering_id: &str, msg_type: u8, data: &[u8]) -> Result<()> {
        self.send_to_at(peering_id, msg_type, now_nanos(), data)
    }

    /// Like [`send_to`](Self::send_to) with an explicit timestamp, so a
    /// fan-out can stamp every copy identically.
    pub fn send_to_at(
        &self,
        peering_id: &str,
        msg_type: u8,
        timestamp: i64,
        data: &[u8],
    ) -> Result<()> {
        let peer = self
            .peer(peering_id)
            .ok_or_else(|| PeeringError::UnknownPeer(peering_id.to_string()))?;

        if ENVELOPE_HEADER_LEN + data.len() <= MAX_FRAME_BODY {
            let frame =
                Envelope::with_timestamp(msg_type, timestamp, data.to_vec()).encode_frame()?;
            self.queue_frame(&peer, frame);
            return Ok(());
        }

        // Oversize: chop the logical message body into chunk messages.
        let body = Envelope::with_timestamp(msg_type, timestamp, data.to_vec()).encode_body();
        let chunks = chopper::chop(&body, peer.next_logical_id())?;
        debug!(
            "chopping {} byte message for {peering_id} into {} chunks",
            body.len(),
            chunks.len()
        );
        for chunk in chunks {
            let frame =
                Envelope::with_timestamp(MSG_TYPE_CHUNK, timestamp, chunk).encode_frame()?;
            self.queue_frame(&peer, frame);
        }
        Ok(())
    }

    fn queue_frame(&self, peer: &Peer, frame: Vec<u8>) {
        match peer.try_send_frame(frame) {
            Ok(true) => self.metrics.messages_sent.inc(),
            Ok(false) => self.metrics.messages_dropped.inc(),
            Err(_) => self.metrics.messages_dropped.inc(),
        }
    }

    // ── Accept side ─────────────────────────────────────────────────────

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.shutdown_notify.notified() => {
                    debug!("accept loop stopped");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("accepted connection from {addr}");
                        let registry = self.clone();
                        tokio::spawn(async move { registry.handle_inbound(stream).await });
                    }
                    Err(e) => error!("accept error: {e}"),
                }
            }
        }
    }

    /// Drive the handshake on a detached inbound connection, binding it
    /// to a registered peer or closing it.
    async fn handle_inbound(self: Arc<Self>, stream: TcpStream) {
        let (mut read_half, mut write_half) = stream.into_split();

        let first = match timeout(self.config.handshake_timeout, read_frame(&mut read_half)).await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!("inbound connection dropped before handshake: {e}");
                return;
            }
            Err(_) => {
                debug!("inbound handshake timed out");
                return;
            }
        };
        let envelope = match Envelope::decode_body(&first) {
            Ok(env) => env,
            Err(e) => {
                warn!("undecodable first frame on inbound connection: {e}");
                return;
            }
        };
        if envelope.msg_type != MSG_TYPE_HANDSHAKE {
            warn!(
                "unexpected message type {} before handshake, closing",
                envelope.msg_type
            );
            return;
        }
        let remote_id = match String::from_utf8(envelope.payload) {
            Ok(id) => id,
            Err(_) => {
                warn!("handshake payload is not a peering id, closing");
                return;
            }
        };

        let peer = match self.peer(&remote_id) {
            Some(peer) if peer.is_inbound() => peer,
            Some(_) => {
                warn!("peer {remote_id} dialed us but is classified outbound, closing");
                return;
            }
            None => {
                debug!("inbound connection from unknown peer {remote_id}, closing");
                return;
            }
        };

        // Reply with our own id to complete the handshake.
        let reply = match Envelope::new(MSG_TYPE_HANDSHAKE, self.my_id().as_bytes().to_vec())
            .encode_frame()
        {
            Ok(frame) => frame,
            Err(e) => {
                error!("handshake reply encoding failed: {e}");
                return;
            }
        };
        if let Err(e) = write_half.write_all(&reply).await {
            debug!("failed to answer handshake from {remote_id}: {e}");
            return;
        }

        info!("connected with peer {remote_id} (inbound)");
        self.install_connection(peer, read_half, write_half);
    }

    // ── Dial side ───────────────────────────────────────────────────────

    /// Background loop keeping one outbound peer connected, with
    /// exponential backoff capped at `reconnect_max`.
    async fn dial_loop(self: Arc<Self>, peer: Arc<Peer>) {
        let mut backoff = self.config.reconnect_initial;
        loop {
            if self.shutting_down() {
                return;
            }
            if peer.is_alive() {
                sleep(self.config.redial_check_interval).await;
                continue;
            }
            match self.dial_once(&peer).await {
                Ok(()) => {
                    backoff = self.config.reconnect_initial;
                }
                Err(e) => {
                    debug!(
                        "dial {} failed: {e}; retrying in {:?}",
                        peer.peering_id(),
                        backoff
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.reconnect_max);
                }
            }
        }
    }

    async fn dial_once(self: &Arc<Self>, peer: &Arc<Peer>) -> Result<()> {
        let remote_id = peer.peering_id().to_string();
        let stream = TcpStream::connect(&remote_id).await?;
        let (mut read_half, mut write_half) = stream.into_split();

        // The initiator sends the *remote* peering id.
        let hello =
            Envelope::new(MSG_TYPE_HANDSHAKE, remote_id.as_bytes().to_vec()).encode_frame()?;
        write_half.write_all(&hello).await?;

        let reply = timeout(self.config.handshake_timeout, read_frame(&mut read_half))
            .await
            .map_err(|_| {
                PeeringError::ProtocolViolation(format!("handshake with {remote_id} timed out"))
            })??;
        let envelope = Envelope::decode_body(&reply)?;
        if envelope.msg_type != MSG_TYPE_HANDSHAKE {
            return Err(PeeringError::ProtocolViolation(format!(
                "expected handshake reply, got type {}",
                envelope.msg_type
            )));
        }
        if envelope.payload != remote_id.as_bytes() {
            return Err(PeeringError::ProtocolViolation(format!(
                "handshake id mismatch: expected {remote_id}, got {:?}",
                String::from_utf8_lossy(&envelope.payload)
            )));
        }

        info!("connected with peer {remote_id} (outbound)");
        self.install_connection(peer.clone(), read_half, write_half);
        Ok(())
    }

    // ── Shared connection plumbing ──────────────────────────────────────

    /// Bind a handshaken connection to its peer and spawn its read and
    /// write loops.
    fn install_connection(
        self: &Arc<Self>,
        peer: Arc<Peer>,
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
    ) {
        let conn_id = self.conn_counter.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.config.send_queue_size);
        if peer.bind_connection(sender, conn_id).is_err() {
            // Already connected; the duplicate is dropped here.
            warn!("duplicate connection for {}, closing", peer.peering_id());
            return;
        }
        self.refresh_alive_gauge();

        let registry = self.clone();
        let write_peer = peer.clone();
        tokio::spawn(async move {
            registry
                .write_loop(write_peer, conn_id, write_half, receiver)
                .await
        });

        let registry = self.clone();
        tokio::spawn(async move { registry.read_loop(peer, conn_id, read_half).await });
    }

    /// Drain the send queue, emit heartbeats, and watch for silence.
    async fn write_loop(
        self: Arc<Self>,
        peer: Arc<Peer>,
        conn_id: u64,
        mut write_half: OwnedWriteHalf,
        mut receiver: mpsc::Receiver<Vec<u8>>,
    ) {
        let mut heartbeat = interval(self.config.heartbeat_period);
        loop {
            tokio::select! {
                frame = receiver.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write_half.write_all(&frame).await {
                            debug!("write to {} failed: {e}", peer.peering_id());
                            break;
                        }
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    let silence = now_nanos() - peer.last_received();
                    if silence > self.config.heartbeat_timeout.as_nanos() as i64 {
                        warn!(
                            "peer {} silent for {}ms, closing connection",
                            peer.peering_id(),
                            silence / 1_000_000
                        );
                        break;
                    }
                    let frame = Envelope::new(MSG_TYPE_HEARTBEAT, Vec::new())
                        .encode_frame()
                        .expect("heartbeat always fits a frame");
                    if write_half.write_all(&frame).await.is_err() {
                        break;
                    }
                    peer.note_heartbeat_sent();
                }
            }
        }
        peer.clear_connection(conn_id);
        self.refresh_alive_gauge();
    }

    /// Decode inbound frames, reassemble chunks, and hand application
    /// messages to the dispatcher. Any protocol violation closes the
    /// connection.
    async fn read_loop(
        self: Arc<Self>,
        peer: Arc<Peer>,
        conn_id: u64,
        mut read_half: OwnedReadHalf,
    ) {
        let mut reassembler = Reassembler::new();
        loop {
            let body = match read_frame(&mut read_half).await {
                Ok(body) => body,
                Err(PeeringError::TransportTransient(e)) => {
                    debug!("connection to {} closed: {e}", peer.peering_id());
                    break;
                }
                Err(e) => {
                    warn!("protocol error from {}: {e}", peer.peering_id());
                    break;
                }
            };
            let envelope = match Envelope::decode_body(&body) {
                Ok(env) => env,
                Err(e) => {
                    warn!("undecodable frame from {}: {e}", peer.peering_id());
                    break;
                }
            };
            peer.note_received();

            match envelope.msg_type {
                MSG_TYPE_HEARTBEAT => continue,
                MSG_TYPE_HANDSHAKE => {
                    warn!(
                        "repeated handshake from {}, closing",
                        peer.peering_id()
                    );
                    break;
                }
                MSG_TYPE_CHUNK => match reassembler.incoming(&envelope.payload) {
                    Ok(Some(full_body)) => {
                        let composite = match Envelope::decode_body(&full_body) {
                            Ok(env) if env.msg_type != MSG_TYPE_CHUNK => env,
                            Ok(_) => {
                                warn!("nested chunk from {}, closing", peer.peering_id());
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    "undecodable reassembled message from {}: {e}",
                                    peer.peering_id()
                                );
                                break;
                            }
                        };
                        if self.deliver(peer.peering_id(), composite).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("chunk reassembly failed from {}: {e}", peer.peering_id());
                        break;
                    }
                },
                _ => {
                    if self.deliver(peer.peering_id(), envelope).is_err() {
                        break;
                    }
                }
            }
        }
        peer.clear_connection(conn_id);
        self.refresh_alive_gauge();
    }

    fn deliver(&self, from_id: &str, envelope: Envelope) -> Result<()> {
        self.metrics.messages_received.inc();
        self.inbound_tx
            .send(InboundMessage {
                from_id: from_id.to_string(),
                envelope,
            })
            .map_err(|_| PeeringError::ChannelClosed)
    }

    fn refresh_alive_gauge(&self) {
        self.metrics.peers_alive.set(self.alive_count() as i64);
    }
}
