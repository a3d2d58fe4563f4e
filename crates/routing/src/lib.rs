// routing/src/lib.rs

//! Adaptive cross-network routing
//!
//! This crate implements transfer routing between supported networks:
//! - Path scoring by cost, latency, quality, success rate and priority
//! - Fixed-window rate limits with backoff per network
//! - The global four-level throttle mode
//! - Economics-driven rerouting away from degraded destinations

pub mod config;
pub mod executor;
pub mod network;
pub mod optimizer;
pub mod rate_limit;
pub mod request;

pub use config::RouteConfig;
pub use executor::{SimulatedExecutor, TransferExecutor, TransferOutcome};
pub use mesh_core::ThrottleMode;
pub use network::SupportedNetwork;
pub use optimizer::{RouteOptimizer, RouteOutcome, RouteSpec};
pub use rate_limit::RateLimit;
pub use request::{RoutePath, RouteRequest, RouteStatus};

use mesh_core::{NetworkId, Timestamp};
use mesh_crypto::Hash;

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors that can occur during routing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(NetworkId),

    #[error("Network {network} is rate limited, retry after {retry_after}")]
    RateLimited {
        network: NetworkId,
        retry_after: Timestamp,
    },

    #[error("Routing halted")]
    Halted,

    #[error("No route found for request {0}")]
    NoRoute(Hash),

    #[error("Route request not found: {0}")]
    RequestNotFound(Hash),

    #[error("Invalid route transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RouteStatus, to: RouteStatus },

    #[error("Invalid route request: {0}")]
    InvalidRequest(String),

    #[error("Invalid route configuration: {0}")]
    InvalidConfig(String),
}
