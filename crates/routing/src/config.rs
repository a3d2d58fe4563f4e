// routing/src/config.rs

use crate::{RoutingError, RoutingResult};
use serde::{Deserialize, Serialize};

/// Highest request priority
pub const MAX_PRIORITY: u8 = 10;

/// Route optimizer parameters (admin-settable, replaced as a whole)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Rate limit window length
    pub window_duration_secs: u64,
    /// Requests per window per network, unless the network overrides it
    pub max_count: u64,
    /// Rejection period after a rate limit breach
    pub backoff_secs: u64,
    /// Age after which an unexecuted request times out
    pub request_timeout_secs: u64,
    /// Reroutes allowed per request
    pub max_reroutes: u32,
    /// Follow economics reroute recommendations
    pub adaptive_routing: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            window_duration_secs: 60,
            max_count: 100,
            backoff_secs: 300,
            request_timeout_secs: 600,
            max_reroutes: 3,
            adaptive_routing: true,
        }
    }
}

impl RouteConfig {
    pub fn validate(&self) -> RoutingResult<()> {
        if self.window_duration_secs == 0 {
            return Err(RoutingError::InvalidConfig("window_duration_secs must be positive".into()));
        }
        if self.max_count == 0 {
            return Err(RoutingError::InvalidConfig("max_count must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RoutingError::InvalidConfig("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backoff_secs, 300);
        assert!(config.adaptive_routing);
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RouteConfig {
            window_duration_secs: 0,
            ..RouteConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
