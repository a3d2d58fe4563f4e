// routing/src/network.rs

use mesh_core::{NetworkId, PerMille};
use mesh_crypto::Address;
use serde::{Deserialize, Serialize};

/// A destination network transfers can be routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedNetwork {
    pub id: NetworkId,
    pub name: String,
    /// Estimated cost of one hop through this network
    pub base_cost: u64,
    pub base_latency_ms: u64,
    /// Static quality rating (0-1000)
    pub quality_score: PerMille,
    pub is_active: bool,
    /// Host paid for relaying completed routes
    #[serde(default)]
    pub relay_host: Option<Address>,
    /// Overrides the configured requests per window
    #[serde(default)]
    pub max_requests_per_window: Option<u64>,
}

impl SupportedNetwork {
    pub fn new(id: NetworkId, name: impl Into<String>, base_cost: u64, base_latency_ms: u64, quality_score: PerMille) -> Self {
        Self {
            id,
            name: name.into(),
            base_cost,
            base_latency_ms,
            quality_score: quality_score.min(1000),
            is_active: true,
            relay_host: None,
            max_requests_per_window: None,
        }
    }

    pub fn with_relay_host(mut self, host: Address) -> Self {
        self.relay_host = Some(host);
        self
    }

    pub fn with_max_requests(mut self, max: u64) -> Self {
        self.max_requests_per_window = Some(max);
        self
    }
}
