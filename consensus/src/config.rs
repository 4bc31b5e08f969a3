//! Consensus operator configuration.

use std::time::Duration;

/// Timing and sizing parameters of the consensus operator.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// How long the committee waits for the current leader to drive a
    /// batch through before rotating. Extended on progress.
    /// Default: 15 s.
    pub leader_rotation_period: Duration,

    /// How long cached balances stay fresh. Default: 10 s.
    pub request_balances_period: Duration,

    /// Minimum spacing between balance re-requests while none arrive.
    pub balances_retry: Duration,

    /// Maximum requests per batch. Default: 100.
    pub max_batch: usize,

    /// `take_action` runs on every `action_tick`-th timer tick.
    pub action_tick: u64,

    /// A telemetry snapshot is logged every `telemetry_tick`-th tick.
    pub telemetry_tick: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            leader_rotation_period: Duration::from_secs(15),
            request_balances_period: Duration::from_secs(10),
            balances_retry: Duration::from_secs(1),
            max_batch: 100,
            action_tick: 2,
            telemetry_tick: 40,
        }
    }
}

impl ConsensusConfig {
    /// Config for local testing: aggressive rotation and refresh.
    pub fn dev_default() -> Self {
        Self {
            leader_rotation_period: Duration::from_millis(500),
            request_balances_period: Duration::from_millis(500),
            balances_retry: Duration::from_millis(50),
            max_batch: 100,
            action_tick: 2,
            telemetry_tick: 40,
        }
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 {
            return Err(ConfigError::InvalidMaxBatch);
        }
        if self.action_tick == 0 {
            return Err(ConfigError::InvalidActionTick);
        }
        if self.leader_rotation_period.is_zero() {
            return Err(ConfigError::InvalidRotationPeriod);
        }
        Ok(())
    }
}

/// Errors in consensus configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("max_batch must be > 0")]
    InvalidMaxBatch,
    #[error("action_tick must be > 0")]
    InvalidActionTick,
    #[error("leader_rotation_period must be > 0")]
    InvalidRotationPeriod,
}
