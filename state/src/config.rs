//! Configuration for the state manager.

use std::time::Duration;

/// Tuning knobs for the state manager.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// How long a catch-up request may stay unanswered before it is
    /// retried against the next alive peer. Default: 1 s.
    pub catchup_retry: Duration,

    /// How long a partially reassembled batch may sit before it is
    /// discarded. Default: 5 s.
    pub reassembly_timeout: Duration,

    /// How often the node re-announces its state index to its peers.
    /// Restarted peers learn the committee's tip from these.
    pub evidence_period: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            catchup_retry: Duration::from_secs(1),
            reassembly_timeout: Duration::from_secs(5),
            evidence_period: Duration::from_secs(1),
        }
    }
}

impl StateConfig {
    /// Config for local testing with shorter intervals.
    pub fn dev_default() -> Self {
        Self {
            catchup_retry: Duration::from_millis(100),
            reassembly_timeout: Duration::from_millis(500),
            evidence_period: Duration::from_millis(100),
        }
    }
}
