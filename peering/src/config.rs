//! Configuration for the peering layer.

use std::time::Duration;

/// Configuration for one node's peering stack.
///
/// `listen_addr` doubles as the node's peering id: it is the exact
/// `host:port` string other committee members have in their descriptor,
/// and the address the listener binds.
#[derive(Debug, Clone)]
pub struct PeeringConfig {
    /// Local listen address and peering id, `host:port`.
    pub listen_addr: String,

    /// How long the accepting / dialing side waits for the handshake
    /// message before giving up on a fresh connection.
    pub handshake_timeout: Duration,

    /// Interval between heartbeats on a handshaken connection.
    /// Default: 5 s.
    pub heartbeat_period: Duration,

    /// Silence threshold after which a connection is considered dead.
    /// Default: 15 s.
    pub heartbeat_timeout: Duration,

    /// First reconnect delay after a failed or dropped outbound connection.
    pub reconnect_initial: Duration,

    /// Reconnect backoff cap. Default: 30 s.
    pub reconnect_max: Duration,

    /// How often an idle dial loop re-checks an already-alive peer.
    pub redial_check_interval: Duration,

    /// Bounded per-connection send queue; full queues drop messages.
    pub send_queue_size: usize,
}

impl Default for PeeringConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            handshake_timeout: Duration::from_secs(3),
            heartbeat_period: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            redial_check_interval: Duration::from_secs(1),
            send_queue_size: 256,
        }
    }
}

impl PeeringConfig {
    /// Config for local testing: loopback listener, short timeouts.
    pub fn dev_default(listen_addr: &str) -> Self {
        Self {
            listen_addr: listen_addr.to_string(),
            handshake_timeout: Duration::from_secs(1),
            heartbeat_period: Duration::from_millis(200),
            heartbeat_timeout: Duration::from_secs(2),
            reconnect_initial: Duration::from_millis(50),
            reconnect_max: Duration::from_millis(500),
            redial_check_interval: Duration::from_millis(100),
            send_queue_size: 64,
        }
    }
}
