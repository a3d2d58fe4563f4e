// economics/src/lib.rs

//! Adaptive economics for the hop mesh
//!
//! This crate implements:
//! - Dynamic fees driven by market pressure, volume and liquidity health
//! - Liquidity health tracking with a sticky emergency state
//! - Health-scaled rate limit thresholds
//! - Performance-weighted host rewards with daily caps and replay protection

pub mod config;
pub mod controller;
pub mod metrics;
pub mod rewards;

pub use config::EconomicConfig;
pub use controller::EconomicsController;
pub use metrics::{HostPerformance, LiquidityMetrics, VolatilityMetrics};
pub use rewards::{
    DistributionReport, HostRewardAccount, RelayCompletion, RewardDistributor, RewardKind, RewardRecord,
};

use mesh_core::{Amount, CoreError};
use mesh_crypto::{Address, Hash};

/// Result type for economics operations
pub type EconomicsResult<T> = Result<T, EconomicsError>;

/// Errors that can occur in economics operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EconomicsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transaction {0} already processed")]
    AlreadyProcessed(Hash),

    #[error("Daily reward cap exceeded for {host}: earned {earned}, cap {cap}")]
    DailyCapExceeded {
        host: Address,
        earned: Amount,
        cap: Amount,
    },

    #[error("Insufficient reward pool: required {required}, available {available}")]
    InsufficientPool { required: Amount, available: Amount },

    #[error("Nothing to claim for {0}")]
    NothingToClaim(Address),

    #[error("Host not found: {0}")]
    HostNotFound(Address),

    #[error(transparent)]
    Core(#[from] CoreError),
}
