// economics/src/controller.rs

use crate::config::EconomicConfig;
use crate::metrics::{HostPerformance, LiquidityMetrics, VolatilityMetrics};
use crate::{EconomicsError, EconomicsResult};
use mesh_core::fixed::{isqrt, mul_div, SCALE};
use mesh_core::{
    Amount, EmergencyLevel, EngineEvent, EventOutbox, NetworkHealth, PerMille, Timestamp,
};

/// Health index below which the emergency fee cap applies
pub const FEE_CAP_HEALTH: PerMille = 200;

/// Health index below which the controller halts
pub const HALT_HEALTH: PerMille = 100;

/// Health index above which an emergency clears
pub const RECOVERY_HEALTH: PerMille = 400;

/// Route quality below which a reroute is recommended
pub const REROUTE_QUALITY: PerMille = 300;

/// Destination utilization above which a reroute is recommended
pub const REROUTE_UTILIZATION: PerMille = 900;

const SECONDS_PER_DAY: u64 = 86_400;

/// Prices usage and rewards from live health metrics
#[derive(Debug)]
pub struct EconomicsController {
    config: EconomicConfig,
    liquidity: LiquidityMetrics,
    volatility: VolatilityMetrics,
    emergency: EmergencyLevel,
    /// Volume observed during `volume_day`
    tx_volume: u128,
    volume_day: u64,
    outbox: EventOutbox,
}

impl EconomicsController {
    pub fn new(config: EconomicConfig) -> EconomicsResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            liquidity: LiquidityMetrics::default(),
            volatility: VolatilityMetrics::default(),
            emergency: EmergencyLevel::None,
            tx_volume: 0,
            volume_day: 0,
            outbox: EventOutbox::new(),
        })
    }

    pub fn config(&self) -> &EconomicConfig {
        &self.config
    }

    /// Replace the configuration as a whole
    pub fn update_config(&mut self, config: EconomicConfig) -> EconomicsResult<()> {
        config.validate()?;
        tracing::info!("Economic configuration replaced");
        self.config = config;
        Ok(())
    }

    pub fn liquidity(&self) -> &LiquidityMetrics {
        &self.liquidity
    }

    pub fn volatility(&self) -> &VolatilityMetrics {
        &self.volatility
    }

    pub fn emergency_level(&self) -> EmergencyLevel {
        self.emergency
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.is_active()
    }

    pub fn tx_volume(&self) -> u128 {
        self.tx_volume
    }

    /// Current fee per transaction.
    ///
    /// base * pressure * sqrt(volume ratio) * (1 / health), every factor at
    /// scale 1000. The volume factor never drops below 1.0, so quiet periods
    /// charge the base fee rather than less.
    pub fn dynamic_fee(&self) -> Amount {
        let pressure_factor = SCALE.saturating_add(self.volatility.market_pressure) as u128;

        let volume_ratio = mul_div(self.tx_volume, SCALE as u128, self.config.target_volume as u128);
        let volume_factor = isqrt(volume_ratio.saturating_mul(SCALE as u128)).max(SCALE as u128);

        let health = self.liquidity.health_index.max(1) as u128;
        let liquidity_factor = mul_div(SCALE as u128, SCALE as u128, health);

        let scale = SCALE as u128;
        let mut fee = mul_div(self.config.base_fee as u128, pressure_factor, scale);
        fee = mul_div(fee, volume_factor, scale);
        fee = mul_div(fee, liquidity_factor, scale);

        if self.emergency.is_active() || self.liquidity.health_index < FEE_CAP_HEALTH {
            fee = fee.min(self.config.max_fee());
        }

        Amount::new(fee)
    }

    /// Requests per window a network may accept at current health and pressure
    pub fn rate_limit_threshold(&self) -> u64 {
        let pressure = self.volatility.market_pressure.saturating_add(SCALE);
        let divisor = isqrt(pressure.saturating_mul(SCALE)).max(1);
        mul_div(
            self.config.base_rate_limit as u128,
            self.liquidity.health_index as u128,
            divisor as u128,
        )
        .min(u64::MAX as u128) as u64
    }

    /// Performance multiplier in [1000, performance_bonus_max]
    pub fn performance_multiplier(&self, performance: &HostPerformance) -> PerMille {
        SCALE
            .saturating_add(performance.blended_score())
            .clamp(SCALE, self.config.performance_bonus_max)
    }

    /// Apply the performance multiplier and, for cross-network work, the fixed bonus
    pub fn adjust_reward(&self, share: Amount, performance: &HostPerformance, cross_network: bool) -> Amount {
        let mut reward = share.scale(self.performance_multiplier(performance));
        if cross_network {
            reward = reward.scale(SCALE.saturating_add(self.config.cross_chain_bonus));
        }
        reward
    }

    /// Reward of a single host for `fee` worth of work
    pub fn host_reward(&self, fee: Amount, cross_network: bool, performance: &HostPerformance) -> Amount {
        let share = fee.scale(self.config.host_reward_pct);
        self.adjust_reward(share, performance, cross_network)
    }

    /// Reward of one hop in a path of `path_len`
    pub fn hop_reward(&self, fee: Amount, path_len: usize, cross_network: bool, performance: &HostPerformance) -> Amount {
        let share = fee.mul_div(
            self.config.host_reward_pct as u128,
            (path_len.max(1) as u128).saturating_mul(SCALE as u128),
        );
        self.adjust_reward(share, performance, cross_network)
    }

    /// Whether traffic to a destination should move elsewhere
    pub fn should_reroute(&self, destination: &NetworkHealth, quality_score: PerMille) -> bool {
        quality_score < REROUTE_QUALITY || destination.capacity_utilization > REROUTE_UTILIZATION
    }

    /// Fold an admin-fed liquidity observation and apply the emergency transitions.
    ///
    /// Between the recovery and cap thresholds the current level is kept.
    pub fn update_liquidity(&mut self, participants: u64, volume: u64, reserve: u64, now: Timestamp) -> PerMille {
        self.liquidity = LiquidityMetrics::observe(
            participants,
            volume,
            reserve,
            (
                self.config.target_participants,
                self.config.target_volume_liquidity,
                self.config.target_reserve,
            ),
            now,
        );
        let health = self.liquidity.health_index;

        if health < HALT_HEALTH {
            self.set_emergency(EmergencyLevel::Halt);
        } else if health < FEE_CAP_HEALTH {
            self.set_emergency(EmergencyLevel::Emergency);
        } else if health > RECOVERY_HEALTH {
            self.set_emergency(EmergencyLevel::None);
        }

        tracing::info!("Liquidity health index {} (emergency {:?})", health, self.emergency);
        health
    }

    pub fn update_volatility(&mut self, market_pressure: PerMille, price_volatility: PerMille, now: Timestamp) -> EconomicsResult<()> {
        if market_pressure > SCALE || price_volatility > SCALE {
            return Err(EconomicsError::InvalidConfig(format!(
                "market pressure {} and volatility {} must be within 0..=1000",
                market_pressure, price_volatility
            )));
        }
        self.volatility = VolatilityMetrics {
            market_pressure,
            price_volatility,
            updated_at: now,
        };
        Ok(())
    }

    /// Accumulate observed volume; the counter restarts every day
    pub fn record_volume(&mut self, amount: Amount, now: Timestamp) {
        let day = now / SECONDS_PER_DAY;
        if day != self.volume_day {
            self.volume_day = day;
            self.tx_volume = 0;
        }
        self.tx_volume = self.tx_volume.saturating_add(amount.inner());
    }

    pub fn activate_emergency(&mut self, level: EmergencyLevel) {
        let level = if level.is_active() { level } else { EmergencyLevel::Emergency };
        self.set_emergency(level);
    }

    pub fn deactivate_emergency(&mut self) {
        self.set_emergency(EmergencyLevel::None);
    }

    fn set_emergency(&mut self, level: EmergencyLevel) {
        if level == self.emergency {
            return;
        }
        let previous = self.emergency;
        self.emergency = level;

        if level.is_active() {
            tracing::warn!("Emergency level {:?} -> {:?}", previous, level);
            self.outbox.emit(EngineEvent::EmergencyActivated { level });
        } else {
            tracing::info!("Emergency cleared");
            self.outbox.emit(EngineEvent::EmergencyCleared);
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.outbox.drain()
    }
}
