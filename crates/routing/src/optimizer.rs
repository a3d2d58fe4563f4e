// routing/src/optimizer.rs

use crate::config::{RouteConfig, MAX_PRIORITY};
use crate::executor::TransferExecutor;
use crate::network::SupportedNetwork;
use crate::rate_limit::RateLimit;
use crate::request::{priority_multiplier, RoutePath, RouteRequest, RouteStatus};
use crate::{RoutingError, RoutingResult};
use economics::EconomicsController;
use mesh_core::fixed::{mul_div, SCALE};
use mesh_core::{
    Amount, CallContext, EmergencyLevel, EngineEvent, EventOutbox, NetworkHealthStore, NetworkId,
    PerMille, ThrottleMode, Timestamp,
};
use mesh_crypto::{Address, Hash};
use std::collections::{BTreeMap, HashMap};

/// Caller-supplied part of a route request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub target_network: NetworkId,
    pub amount: Amount,
    /// 0 for no limit
    pub max_cost: u64,
    /// 0 for no limit
    pub max_latency_ms: u64,
    /// 0-10
    pub priority: u8,
}

/// What an execution attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Completed {
        request_id: Hash,
        destination: NetworkId,
        latency_ms: u64,
        amount: Amount,
        fee: Amount,
        relay_host: Option<Address>,
    },
    Failed {
        request_id: Hash,
        destination: NetworkId,
        latency_ms: u64,
        relay_host: Option<Address>,
    },
    /// Destination degraded; the request now targets another network
    Rerouted { from: NetworkId, to: NetworkId },
    /// Request outlived the timeout before executing
    TimedOut,
}

/// Scores, executes and throttles cross-network transfers
#[derive(Debug)]
pub struct RouteOptimizer {
    config: RouteConfig,
    networks: BTreeMap<NetworkId, SupportedNetwork>,
    rate_limits: HashMap<NetworkId, RateLimit>,
    requests: HashMap<Hash, RouteRequest>,
    throttle_mode: ThrottleMode,
    request_nonce: u64,
    outbox: EventOutbox,
}

impl RouteOptimizer {
    pub fn new(config: RouteConfig) -> RoutingResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            networks: BTreeMap::new(),
            rate_limits: HashMap::new(),
            requests: HashMap::new(),
            throttle_mode: ThrottleMode::Normal,
            request_nonce: 0,
            outbox: EventOutbox::new(),
        })
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    /// Replace the configuration as a whole. Running windows keep their counts.
    pub fn update_config(&mut self, config: RouteConfig) -> RoutingResult<()> {
        config.validate()?;
        for (id, limit) in self.rate_limits.iter_mut() {
            limit.window_duration = config.window_duration_secs;
            limit.max_count = self.networks.get(id)
                .and_then(|n| n.max_requests_per_window)
                .unwrap_or(config.max_count);
        }
        tracing::info!("Route configuration replaced");
        self.config = config;
        Ok(())
    }

    /// Register or replace a supported network
    pub fn add_network(&mut self, network: SupportedNetwork, now: Timestamp) {
        let max_count = network.max_requests_per_window.unwrap_or(self.config.max_count);
        self.rate_limits.entry(network.id)
            .and_modify(|l| l.max_count = max_count)
            .or_insert_with(|| RateLimit::new(max_count, self.config.window_duration_secs, now));

        tracing::info!("Supported network {} ({}) registered", network.id, network.name);
        self.networks.insert(network.id, network);
    }

    pub fn set_network_active(&mut self, id: NetworkId, active: bool) -> RoutingResult<()> {
        let network = self.networks.get_mut(&id)
            .ok_or(RoutingError::UnsupportedNetwork(id))?;
        network.is_active = active;
        Ok(())
    }

    pub fn network(&self, id: NetworkId) -> Option<&SupportedNetwork> {
        self.networks.get(&id)
    }

    pub fn networks(&self) -> impl Iterator<Item = &SupportedNetwork> {
        self.networks.values()
    }

    pub fn rate_limit(&self, id: NetworkId) -> Option<&RateLimit> {
        self.rate_limits.get(&id)
    }

    pub fn request(&self, id: &Hash) -> Option<&RouteRequest> {
        self.requests.get(id)
    }

    pub fn throttle_mode(&self) -> ThrottleMode {
        self.throttle_mode
    }

    /// Admin override; the next execution recomputes the mode from health
    pub fn set_throttle_mode(&mut self, mode: ThrottleMode) {
        self.change_throttle_mode(mode);
    }

    /// Recompute the throttle mode from aggregate health
    pub fn refresh_throttle_mode(&mut self, health: &NetworkHealthStore) -> ThrottleMode {
        self.change_throttle_mode(health.throttle_mode());
        self.throttle_mode
    }

    fn change_throttle_mode(&mut self, mode: ThrottleMode) {
        if mode == self.throttle_mode {
            return;
        }
        let from = self.throttle_mode;
        self.throttle_mode = mode;
        tracing::warn!("Throttle mode {} -> {}", from, mode);
        self.outbox.emit(EngineEvent::ThrottleModeChanged { from, to: mode });
    }

    fn is_available(&self, network: &SupportedNetwork, now: Timestamp) -> bool {
        network.is_active
            && !self.rate_limits.get(&network.id).is_some_and(|l| l.in_backoff(now))
    }

    /// Single-hop path to `destination`, if it meets the cost and latency bounds.
    ///
    /// score = quality * success * priority * 1000 / (cost * latency)
    fn score_path(
        &self,
        network: &SupportedNetwork,
        spec: &RouteSpec,
        health: &NetworkHealthStore,
    ) -> Option<RoutePath> {
        let cost = network.base_cost.max(1);
        let latency = health.get(network.id)
            .map(|h| h.avg_latency_ms)
            .filter(|l| *l > 0)
            .unwrap_or(network.base_latency_ms)
            .max(1);

        if spec.max_cost > 0 && cost > spec.max_cost {
            return None;
        }
        if spec.max_latency_ms > 0 && latency > spec.max_latency_ms {
            return None;
        }

        let success = health.success_rate(network.id);
        let quality = network.quality_score;
        let priority = priority_multiplier(spec.priority);

        let numerator = (quality as u128)
            .saturating_mul(success as u128)
            .saturating_mul(priority as u128);
        let score = mul_div(numerator, SCALE as u128, (cost as u128).saturating_mul(latency as u128));

        Some(RoutePath {
            hops: vec![network.id],
            hop_costs: vec![cost],
            hop_latencies_ms: vec![latency],
            total_cost: cost,
            total_latency_ms: latency,
            quality_score: path_quality(quality, success),
            score,
        })
    }

    /// Highest scoring available network, skipping `exclude`.
    ///
    /// On equal scores the requested target wins, then the lowest id.
    fn best_path(
        &self,
        spec: &RouteSpec,
        exclude: Option<NetworkId>,
        health: &NetworkHealthStore,
        now: Timestamp,
    ) -> Option<RoutePath> {
        let mut best: Option<RoutePath> = None;
        for network in self.networks.values() {
            if Some(network.id) == exclude || !self.is_available(network, now) {
                continue;
            }
            let Some(path) = self.score_path(network, spec, health) else {
                continue;
            };
            if path.score == 0 {
                continue;
            }
            let better = match &best {
                None => true,
                Some(b) => path.score > b.score
                    || (path.score == b.score && network.id == spec.target_network),
            };
            if better {
                best = Some(path);
            }
        }
        best
    }

    /// Validate, score and record a transfer request
    pub fn request_route(
        &mut self,
        ctx: &CallContext,
        spec: RouteSpec,
        fee: Amount,
        health: &NetworkHealthStore,
    ) -> RoutingResult<Hash> {
        if self.throttle_mode == ThrottleMode::Halt {
            return Err(RoutingError::Halted);
        }
        if spec.priority > MAX_PRIORITY {
            return Err(RoutingError::InvalidRequest(format!(
                "priority {} above {}",
                spec.priority, MAX_PRIORITY
            )));
        }
        if spec.amount.is_zero() {
            return Err(RoutingError::InvalidRequest("amount must be positive".into()));
        }

        if !self.networks.get(&spec.target_network).is_some_and(|n| n.is_active) {
            return Err(RoutingError::UnsupportedNetwork(spec.target_network));
        }
        if let Some(limit) = self.rate_limits.get(&spec.target_network) {
            if limit.in_backoff(ctx.now) {
                return Err(RoutingError::RateLimited {
                    network: spec.target_network,
                    retry_after: limit.backoff_until,
                });
            }
        }

        let path = self.best_path(&spec, None, health, ctx.now);

        self.request_nonce = self.request_nonce.wrapping_add(1);
        let request_id = ctx.derive_id(b"route", self.request_nonce);
        let mut request = RouteRequest {
            id: request_id,
            sender: ctx.caller,
            target_network: spec.target_network,
            amount: spec.amount,
            max_cost: spec.max_cost,
            max_latency_ms: spec.max_latency_ms,
            priority: spec.priority,
            fee,
            path: None,
            status: RouteStatus::Pending,
            reroutes: 0,
            created_at: ctx.now,
            updated_at: ctx.now,
        };
        self.outbox.emit(EngineEvent::RouteRequested {
            request_id,
            sender: ctx.caller,
            target: spec.target_network,
            amount: spec.amount,
        });

        let result = match path {
            Some(path) => {
                request.transition(RouteStatus::Calculated, ctx.now)?;
                tracing::info!(
                    "Route {} for network {} calculated via {:?} (quality {})",
                    request_id,
                    spec.target_network,
                    path.hops,
                    path.quality_score
                );
                self.outbox.emit(EngineEvent::RouteCalculated {
                    request_id,
                    hops: path.hops.clone(),
                    quality_score: path.quality_score,
                });
                request.path = Some(path);
                Ok(request_id)
            }
            None => {
                request.transition(RouteStatus::Failed, ctx.now)?;
                tracing::warn!("No route to network {} for {}", spec.target_network, request_id);
                Err(RoutingError::NoRoute(request_id))
            }
        };

        self.requests.insert(request_id, request);
        result
    }

    /// Execute a calculated request, or reroute it when its destination degraded
    pub fn execute_route<E: TransferExecutor + ?Sized>(
        &mut self,
        ctx: &CallContext,
        request_id: &Hash,
        economics: &EconomicsController,
        health: &mut NetworkHealthStore,
        executor: &mut E,
    ) -> RoutingResult<RouteOutcome> {
        if self.throttle_mode == ThrottleMode::Halt || economics.emergency_level() == EmergencyLevel::Halt {
            return Err(RoutingError::Halted);
        }

        let now = ctx.now;
        let request = self.requests.get_mut(request_id)
            .ok_or(RoutingError::RequestNotFound(*request_id))?;

        if request.status.is_executable() && request.is_timed_out(now, self.config.request_timeout_secs) {
            request.transition(RouteStatus::Timeout, now)?;
            tracing::warn!("Route {} timed out", request_id);
            return Ok(RouteOutcome::TimedOut);
        }
        if !request.status.is_executable() {
            return Err(RoutingError::InvalidTransition {
                from: request.status,
                to: RouteStatus::Executing,
            });
        }

        let request = request.clone();
        let path = request.path.clone()
            .ok_or_else(|| RoutingError::InvalidRequest("request has no path".into()))?;
        let destination = path.destination()
            .ok_or_else(|| RoutingError::InvalidRequest("empty path".into()))?;

        let spec = RouteSpec {
            target_network: destination,
            amount: request.amount,
            max_cost: request.max_cost,
            max_latency_ms: request.max_latency_ms,
            priority: request.priority,
        };

        if self.config.adaptive_routing && request.reroutes < self.config.max_reroutes {
            let quality = self.networks.get(&destination)
                .map(|n| path_quality(n.quality_score, health.success_rate(destination)))
                .unwrap_or(0);
            let destination_health = health.health_or_default(destination);

            if economics.should_reroute(&destination_health, quality) {
                if let Some(alternative) = self.best_path(&spec, Some(destination), health, now) {
                    return self.reroute(request_id, destination, alternative, now);
                }
                tracing::warn!("Route {} should reroute but no alternative exists", request_id);
            }
        }

        let max_count = self.networks.get(&destination)
            .and_then(|n| n.max_requests_per_window)
            .unwrap_or(self.config.max_count)
            .min(economics.rate_limit_threshold().max(1));
        let mode = self.throttle_mode;
        let backoff = self.config.backoff_secs;
        let window = self.config.window_duration_secs;

        let limit = self.rate_limits.entry(destination)
            .or_insert_with(|| RateLimit::new(max_count, window, now));
        limit.max_count = max_count;
        let was_throttled = limit.in_backoff(now);
        if let Err(retry_after) = limit.try_acquire(now, mode, backoff) {
            if !was_throttled {
                tracing::warn!("Rate limit hit on network {} until {}", destination, retry_after);
                self.outbox.emit(EngineEvent::RateLimitTriggered {
                    network: destination,
                    backoff_until: retry_after,
                });
            }
            return Err(RoutingError::RateLimited {
                network: destination,
                retry_after,
            });
        }

        let request = self.requests.get_mut(request_id)
            .ok_or(RoutingError::RequestNotFound(*request_id))?;
        request.transition(RouteStatus::Executing, now)?;

        let outcome = executor.execute(&path, request.amount, health);
        health.record_outcome(destination, outcome.success, outcome.latency_ms, now);

        let status = if outcome.success { RouteStatus::Completed } else { RouteStatus::Failed };
        request.transition(status, now)?;
        let amount = request.amount;
        let fee = request.fee;

        tracing::info!(
            "Route {} to network {} {} in {}ms",
            request_id,
            destination,
            if outcome.success { "completed" } else { "failed" },
            outcome.latency_ms
        );
        self.outbox.emit(EngineEvent::RouteExecuted {
            request_id: *request_id,
            success: outcome.success,
            latency_ms: outcome.latency_ms,
        });

        self.refresh_throttle_mode(health);

        let relay_host = self.networks.get(&destination).and_then(|n| n.relay_host);
        Ok(if outcome.success {
            RouteOutcome::Completed {
                request_id: *request_id,
                destination,
                latency_ms: outcome.latency_ms,
                amount,
                fee,
                relay_host,
            }
        } else {
            RouteOutcome::Failed {
                request_id: *request_id,
                destination,
                latency_ms: outcome.latency_ms,
                relay_host,
            }
        })
    }

    fn reroute(
        &mut self,
        request_id: &Hash,
        from: NetworkId,
        alternative: RoutePath,
        now: Timestamp,
    ) -> RoutingResult<RouteOutcome> {
        let to = alternative.destination().unwrap_or(from);
        let request = self.requests.get_mut(request_id)
            .ok_or(RoutingError::RequestNotFound(*request_id))?;

        request.transition(RouteStatus::Rerouted, now)?;
        request.target_network = to;
        request.reroutes += 1;
        request.path = Some(alternative);

        tracing::info!("Route {} rerouted from network {} to {}", request_id, from, to);
        self.outbox.emit(EngineEvent::RouteRerouted {
            request_id: *request_id,
            from,
            to,
        });
        Ok(RouteOutcome::Rerouted { from, to })
    }

    /// Time out every executable request older than the timeout
    pub fn sweep_timeouts(&mut self, now: Timestamp) -> Vec<Hash> {
        let timeout = self.config.request_timeout_secs;
        let mut timed_out = Vec::new();
        for (id, request) in self.requests.iter_mut() {
            if request.status.is_executable()
                && request.is_timed_out(now, timeout)
                && request.transition(RouteStatus::Timeout, now).is_ok()
            {
                timed_out.push(*id);
            }
        }
        timed_out.sort();
        timed_out
    }

    /// Request counts per status
    pub fn status_counts(&self) -> HashMap<RouteStatus, usize> {
        let mut counts = HashMap::new();
        for request in self.requests.values() {
            *counts.entry(request.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.outbox.drain()
    }
}

/// Static quality weighted by live success rate
fn path_quality(quality: PerMille, success_rate: PerMille) -> PerMille {
    quality.saturating_mul(success_rate) / SCALE
}
