// economics/src/config.rs

use crate::{EconomicsError, EconomicsResult};
use mesh_core::fixed::SCALE;
use mesh_core::PerMille;
use serde::{Deserialize, Serialize};

/// Economic parameters (admin-settable, replaced as a whole)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicConfig {
    /// Fee at neutral pressure, target volume and full liquidity health
    pub base_fee: u64,
    /// Fee ceiling in emergencies, as a multiple of `base_fee`
    pub max_fee_multiplier: u64,
    /// Transaction volume per day considered normal
    pub target_volume: u64,
    /// Rate limit at full health and zero market pressure
    pub base_rate_limit: u64,
    pub target_participants: u64,
    pub target_volume_liquidity: u64,
    pub target_reserve: u64,
    /// Share of a fee paid out to hosts
    pub host_reward_pct: PerMille,
    /// Upper clamp of the performance multiplier (1000 = 1.0x)
    pub performance_bonus_max: PerMille,
    /// Extra share for cross-network work
    pub cross_chain_bonus: PerMille,
    /// Per-host daily cap as a share of the reward pool
    pub daily_cap_per_mille: PerMille,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        Self {
            base_fee: 1000,
            max_fee_multiplier: 10,
            target_volume: 1_000_000,
            base_rate_limit: 100,
            target_participants: 1000,
            target_volume_liquidity: 1_000_000,
            target_reserve: 10_000_000,
            host_reward_pct: 700,
            performance_bonus_max: 2000,
            cross_chain_bonus: 100,
            daily_cap_per_mille: 10,
        }
    }
}

impl EconomicConfig {
    pub fn validate(&self) -> EconomicsResult<()> {
        if self.max_fee_multiplier == 0 {
            return Err(EconomicsError::InvalidConfig("max_fee_multiplier must be positive".into()));
        }
        if self.target_volume == 0
            || self.target_participants == 0
            || self.target_volume_liquidity == 0
            || self.target_reserve == 0
        {
            return Err(EconomicsError::InvalidConfig("targets must be positive".into()));
        }
        if self.host_reward_pct > SCALE {
            return Err(EconomicsError::InvalidConfig("host_reward_pct above 1000".into()));
        }
        if self.performance_bonus_max < SCALE {
            return Err(EconomicsError::InvalidConfig("performance_bonus_max below 1000".into()));
        }
        if self.daily_cap_per_mille == 0 || self.daily_cap_per_mille > SCALE {
            return Err(EconomicsError::InvalidConfig("daily_cap_per_mille must be in (0, 1000]".into()));
        }
        Ok(())
    }

    /// Emergency fee ceiling
    pub fn max_fee(&self) -> u128 {
        (self.base_fee as u128).saturating_mul(self.max_fee_multiplier as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EconomicConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_fee(), 10_000);
    }

    #[test]
    fn test_zero_target_rejected() {
        let config = EconomicConfig {
            target_reserve: 0,
            ..EconomicConfig::default()
        };
        assert!(matches!(config.validate(), Err(EconomicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_bonus_below_neutral_rejected() {
        let config = EconomicConfig {
            performance_bonus_max: 900,
            ..EconomicConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
