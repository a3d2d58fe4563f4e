// economics/src/metrics.rs

use mesh_core::fixed::{capped_ratio, SCALE};
use mesh_core::{PerMille, Timestamp};
use serde::{Deserialize, Serialize};

/// Admin-fed liquidity observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityMetrics {
    pub participants: u64,
    pub volume: u64,
    pub reserve: u64,
    /// min of the three capped ratios (0-1000)
    pub health_index: PerMille,
    pub updated_at: Timestamp,
}

impl Default for LiquidityMetrics {
    /// Fully healthy until the first observation arrives
    fn default() -> Self {
        Self {
            participants: 0,
            volume: 0,
            reserve: 0,
            health_index: SCALE,
            updated_at: 0,
        }
    }
}

impl LiquidityMetrics {
    pub fn observe(
        participants: u64,
        volume: u64,
        reserve: u64,
        targets: (u64, u64, u64),
        now: Timestamp,
    ) -> Self {
        let (target_participants, target_volume, target_reserve) = targets;
        let health_index = capped_ratio(participants, target_participants)
            .min(capped_ratio(volume, target_volume))
            .min(capped_ratio(reserve, target_reserve));

        Self {
            participants,
            volume,
            reserve,
            health_index,
            updated_at: now,
        }
    }
}

/// Admin-fed market observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    /// Buy/sell pressure (0-1000)
    pub market_pressure: PerMille,
    /// Recent price volatility (0-1000)
    pub price_volatility: PerMille,
    pub updated_at: Timestamp,
}

/// Inputs of the performance multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPerformance {
    /// 0-1000
    pub success_rate: PerMille,
    /// Recent latency in milliseconds
    pub latency_ms: u64,
    /// Long-run average latency in milliseconds
    pub historical_latency_ms: u64,
    /// 0-1000
    pub reputation: PerMille,
}

impl Default for HostPerformance {
    fn default() -> Self {
        Self {
            success_rate: SCALE,
            latency_ms: 0,
            historical_latency_ms: 0,
            reputation: 500,
        }
    }
}

impl HostPerformance {
    /// historical / recent, capped at 1000. Neutral 1000 without history.
    pub fn latency_score(&self) -> PerMille {
        if self.latency_ms == 0 || self.historical_latency_ms == 0 {
            return SCALE;
        }
        capped_ratio(self.historical_latency_ms, self.latency_ms)
    }

    /// 40% success rate, 30% latency score, 30% reputation (0-1000)
    pub fn blended_score(&self) -> PerMille {
        let success = self.success_rate.min(SCALE).saturating_mul(40);
        let latency = self.latency_score().saturating_mul(30);
        let reputation = self.reputation.min(SCALE).saturating_mul(30);
        success.saturating_add(latency).saturating_add(reputation) / 100
    }
}
