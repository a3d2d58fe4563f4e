// mesh-core/src/health.rs

use crate::fixed::{ema, SCALE};
use crate::{NetworkId, PerMille, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rolling health of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHealth {
    /// Success rate EMA (0-1000)
    pub success_rate: PerMille,
    /// Latency EMA in milliseconds
    pub avg_latency_ms: u64,
    /// Share of capacity in use (0-1000)
    pub capacity_utilization: PerMille,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Total outcomes recorded
    pub total_tx: u64,
    /// Last update timestamp
    pub updated_at: Timestamp,
}

impl NetworkHealth {
    /// Neutral record: a network with no history counts as fully healthy
    pub fn new(now: Timestamp) -> Self {
        Self {
            success_rate: SCALE,
            avg_latency_ms: 0,
            capacity_utilization: 0,
            consecutive_failures: 0,
            total_tx: 0,
            updated_at: now,
        }
    }

    /// Fold one outcome into the EMAs.
    ///
    /// The first observed latency seeds the average instead of being blended
    /// with the zero placeholder.
    pub fn record(&mut self, success: bool, latency_ms: u64, now: Timestamp) {
        let sample = if success { SCALE } else { 0 };
        self.success_rate = ema(self.success_rate, sample).min(SCALE);
        self.avg_latency_ms = if self.total_tx == 0 {
            latency_ms
        } else {
            ema(self.avg_latency_ms, latency_ms)
        };
        self.consecutive_failures = if success {
            0
        } else {
            self.consecutive_failures.saturating_add(1)
        };
        self.total_tx = self.total_tx.saturating_add(1);
        self.updated_at = now;
    }
}

/// Global four-level capacity governor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThrottleMode {
    #[default]
    Normal,
    Congested,
    Emergency,
    Halt,
}

impl ThrottleMode {
    /// Mode for the given aggregate metrics. Most severe matching level wins.
    pub fn from_metrics(success_rate: PerMille, latency_ms: u64) -> Self {
        if success_rate < 500 || latency_ms > 20_000 {
            ThrottleMode::Halt
        } else if success_rate < 700 || latency_ms > 10_000 {
            ThrottleMode::Emergency
        } else if success_rate < 850 || latency_ms > 5_000 {
            ThrottleMode::Congested
        } else {
            ThrottleMode::Normal
        }
    }

    /// Share of configured capacity allowed in this mode (0-1000)
    pub fn capacity(&self) -> PerMille {
        match self {
            ThrottleMode::Normal => 1000,
            ThrottleMode::Congested => 700,
            ThrottleMode::Emergency => 300,
            ThrottleMode::Halt => 0,
        }
    }
}

impl std::fmt::Display for ThrottleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ThrottleMode::Normal => "NORMAL",
            ThrottleMode::Congested => "CONGESTED",
            ThrottleMode::Emergency => "EMERGENCY",
            ThrottleMode::Halt => "HALT",
        };
        f.write_str(name)
    }
}

/// Per-network and aggregate health, shared by every component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkHealthStore {
    networks: HashMap<NetworkId, NetworkHealth>,
}

impl NetworkHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transfer outcome for a network
    pub fn record_outcome(&mut self, network: NetworkId, success: bool, latency_ms: u64, now: Timestamp) {
        let health = self.networks.entry(network)
            .or_insert_with(|| NetworkHealth::new(now));
        health.record(success, latency_ms, now);

        if health.consecutive_failures >= 3 {
            tracing::warn!(
                "Network {} has {} consecutive failures (success rate {})",
                network,
                health.consecutive_failures,
                health.success_rate
            );
        }
    }

    /// Overwrite the rolling metrics of a network with an externally fed observation
    pub fn observe(&mut self, network: NetworkId, success_rate: PerMille, avg_latency_ms: u64, now: Timestamp) {
        let health = self.networks.entry(network)
            .or_insert_with(|| NetworkHealth::new(now));
        health.success_rate = success_rate.min(SCALE);
        health.avg_latency_ms = avg_latency_ms;
        health.updated_at = now;
    }

    pub fn set_capacity_utilization(&mut self, network: NetworkId, utilization: PerMille, now: Timestamp) {
        let health = self.networks.entry(network)
            .or_insert_with(|| NetworkHealth::new(now));
        health.capacity_utilization = utilization.min(SCALE);
        health.updated_at = now;
    }

    pub fn get(&self, network: NetworkId) -> Option<&NetworkHealth> {
        self.networks.get(&network)
    }

    /// Health of a network, neutral if never observed
    pub fn health_or_default(&self, network: NetworkId) -> NetworkHealth {
        self.networks.get(&network)
            .cloned()
            .unwrap_or_else(|| NetworkHealth::new(0))
    }

    /// Success rate with the 100% fallback for networks without history
    pub fn success_rate(&self, network: NetworkId) -> PerMille {
        self.networks.get(&network)
            .map(|h| h.success_rate)
            .unwrap_or(SCALE)
    }

    /// Aggregate success rate and latency: plain mean over tracked networks.
    ///
    /// Returns `(1000, 0)` when nothing has been observed yet.
    pub fn aggregate(&self) -> (PerMille, u64) {
        let count = self.networks.len() as u64;
        if count == 0 {
            return (SCALE, 0);
        }

        let success: u64 = self.networks.values()
            .map(|h| h.success_rate)
            .fold(0u64, |acc, v| acc.saturating_add(v));
        let latency: u64 = self.networks.values()
            .map(|h| h.avg_latency_ms)
            .fold(0u64, |acc, v| acc.saturating_add(v));

        (success / count, latency / count)
    }

    /// Throttle mode implied by the aggregate metrics
    pub fn throttle_mode(&self) -> ThrottleMode {
        let (success_rate, latency) = self.aggregate();
        ThrottleMode::from_metrics(success_rate, latency)
    }

    pub fn total_tx(&self) -> u64 {
        self.networks.values().map(|h| h.total_tx).sum()
    }

    pub fn tracked_networks(&self) -> usize {
        self.networks.len()
    }
}
