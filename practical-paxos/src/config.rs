use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PaxosError;
use crate::proposal::NodeId;

fn default_heartbeat_period_ms() -> u64 {
    1000
}

fn default_liveness_window_ms() -> u64 {
    5000
}

/// Upper bound for both timing settings (one day).
pub const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Settings for one heartbeat node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub uid: NodeId,
    /// Number of distinct acceptors needed for a promise or acceptance quorum.
    pub quorum_size: usize,
    /// Leader designated at startup, if any.
    #[serde(default)]
    pub leader: Option<NodeId>,
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,
}

impl NodeConfig {
    pub fn new(uid: NodeId, quorum_size: usize) -> Self {
        NodeConfig {
            uid,
            quorum_size,
            leader: None,
            heartbeat_period_ms: default_heartbeat_period_ms(),
            liveness_window_ms: default_liveness_window_ms(),
        }
    }

    /// Quorum size for a cluster of `nodes` acceptors.
    pub fn majority(nodes: usize) -> usize {
        nodes / 2 + 1
    }

    pub fn with_leader(mut self, leader: Option<NodeId>) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_timing(mut self, heartbeat_period: Duration, liveness_window: Duration) -> Self {
        self.heartbeat_period_ms = millis(heartbeat_period);
        self.liveness_window_ms = millis(liveness_window);
        self
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn validate(&self) -> Result<(), PaxosError> {
        if self.quorum_size == 0 {
            return Err(PaxosError::Config("quorum_size must be at least 1".to_string()));
        }
        if self.heartbeat_period_ms == 0 {
            return Err(PaxosError::Config("heartbeat_period_ms must be positive".to_string()));
        }
        if self.liveness_window_ms > MAX_TIMING_MS {
            return Err(PaxosError::Config(format!(
                "liveness_window_ms ({}) must not exceed {}",
                self.liveness_window_ms, MAX_TIMING_MS
            )));
        }
        if self.liveness_window_ms <= self.heartbeat_period_ms {
            return Err(PaxosError::Config(format!(
                "liveness_window_ms ({}) must exceed heartbeat_period_ms ({})",
                self.liveness_window_ms, self.heartbeat_period_ms
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, PaxosError> {
        let config: NodeConfig = serde_json::from_str(json)
            .map_err(|e| PaxosError::Config(format!("Failed to parse json: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PaxosError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PaxosError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}
