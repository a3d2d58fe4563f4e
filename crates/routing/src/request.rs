// routing/src/request.rs

use crate::{RoutingError, RoutingResult};
use mesh_core::{Amount, NetworkId, PerMille, Timestamp};
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};

/// Route request lifecycle
///
/// PENDING -> CALCULATED -> EXECUTING -> {COMPLETED | FAILED}, with
/// CALCULATED/REROUTED -> {REROUTED | TIMEOUT | FAILED} on the side.
/// COMPLETED, FAILED and TIMEOUT are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    Pending,
    Calculated,
    Executing,
    Completed,
    Failed,
    Rerouted,
    Timeout,
}

impl RouteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Failed | RouteStatus::Timeout)
    }

    /// Ready to execute
    pub fn is_executable(&self) -> bool {
        matches!(self, RouteStatus::Calculated | RouteStatus::Rerouted)
    }

    pub fn can_transition(&self, to: RouteStatus) -> bool {
        use RouteStatus::*;
        matches!(
            (self, to),
            (Pending, Calculated)
                | (Pending, Failed)
                | (Calculated, Executing)
                | (Calculated, Rerouted)
                | (Calculated, Timeout)
                | (Calculated, Failed)
                | (Rerouted, Executing)
                | (Rerouted, Rerouted)
                | (Rerouted, Timeout)
                | (Rerouted, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

/// Chosen hops of a route, destination last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePath {
    pub hops: Vec<NetworkId>,
    pub hop_costs: Vec<u64>,
    pub hop_latencies_ms: Vec<u64>,
    pub total_cost: u64,
    pub total_latency_ms: u64,
    /// Weakest hop quality weighted by its success rate (0-1000)
    pub quality_score: PerMille,
    /// Ranking score of the path
    pub score: u128,
}

impl RoutePath {
    pub fn destination(&self) -> Option<NetworkId> {
        self.hops.last().copied()
    }
}

/// One transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub id: Hash,
    pub sender: Address,
    pub target_network: NetworkId,
    pub amount: Amount,
    /// 0 for no limit
    pub max_cost: u64,
    /// 0 for no limit
    pub max_latency_ms: u64,
    /// 0-10
    pub priority: u8,
    /// Fee charged at request time
    pub fee: Amount,
    pub path: Option<RoutePath>,
    pub status: RouteStatus,
    pub reroutes: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RouteRequest {
    /// Apply a state transition, rejecting anything the lifecycle forbids
    pub fn transition(&mut self, to: RouteStatus, now: Timestamp) -> RoutingResult<()> {
        if !self.status.can_transition(to) {
            return Err(RoutingError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_timed_out(&self, now: Timestamp, timeout_secs: u64) -> bool {
        now.saturating_sub(self.created_at) > timeout_secs
    }
}

/// Priority 0-10 mapped linearly onto 500-1000
pub fn priority_multiplier(priority: u8) -> PerMille {
    500 + (priority.min(crate::config::MAX_PRIORITY) as PerMille) * 50
}
