// node/src/engine.rs

//! Engine facade over consensus, economics, rewards and routing
//!
//! Every public operation enters the re-entrancy guard before it touches
//! state and then runs to completion against one mutable borrow of it.
//! Privileged operations check the admin address first. Component events are
//! collected after each operation, failed ones included.

use crate::config::NodeConfig;
use crate::EngineResult;
use consensus::{
    ConsensusError, ConsensusParams, ConsensusProof, ConsensusStatus, HopConsensus, HopOutcome, ProofRequest,
    ValidatorNode,
};
use economics::{DistributionReport, EconomicConfig, EconomicsController, RelayCompletion, RewardDistributor};
use mesh_core::{
    Amount, CallContext, CoreError, EmergencyLevel, EngineEvent, InMemoryLedger, NetworkHealthStore, NetworkId,
    PerMille, ReentrancyGuard, ShardId, ThrottleMode, Timestamp, TokenLedger,
};
use mesh_crypto::{Address, Hash};
use routing::{
    RouteConfig, RouteOptimizer, RouteOutcome, RouteRequest, RouteSpec, RouteStatus, RoutingError,
    SimulatedExecutor, SupportedNetwork, TransferExecutor,
};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub validators: usize,
    pub active_validators: usize,
    pub shards: usize,
    pub proofs: HashMap<ConsensusStatus, usize>,
    pub routes: HashMap<RouteStatus, usize>,
    /// Seconds, EMA over reached proofs
    pub avg_consensus_time: u64,
    pub throttle_mode: ThrottleMode,
    pub emergency_level: EmergencyLevel,
    pub liquidity_health: PerMille,
    pub dynamic_fee: Amount,
    pub reward_pool: Amount,
    pub success_rate: PerMille,
    pub avg_latency_ms: u64,
}

/// What a maintenance sweep closed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_proofs: Vec<Hash>,
    pub timed_out_routes: Vec<Hash>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_proofs.is_empty() && self.timed_out_routes.is_empty()
    }
}

struct EngineState<L> {
    consensus: HopConsensus,
    economics: EconomicsController,
    rewards: RewardDistributor,
    routing: RouteOptimizer,
    health: NetworkHealthStore,
    executor: Box<dyn TransferExecutor + Send>,
    ledger: L,
    events: Vec<EngineEvent>,
}

impl<L> EngineState<L> {
    fn collect_events(&mut self) {
        self.events.extend(self.consensus.drain_events());
        self.events.extend(self.economics.drain_events());
        self.events.extend(self.rewards.drain_events());
        self.events.extend(self.routing.drain_events());
    }

    /// Mirror the economic emergency level into consensus
    fn sync_emergency(&mut self) {
        self.consensus.set_emergency_level(self.economics.emergency_level());
    }

    fn is_halted(&self) -> bool {
        self.economics.emergency_level() == EmergencyLevel::Halt
    }
}

/// Single-writer engine: consensus, economics, rewards and routing behind one guard
pub struct HopMeshEngine<L: TokenLedger = InMemoryLedger> {
    admin: Address,
    guard: ReentrancyGuard,
    state: RefCell<EngineState<L>>,
}

impl HopMeshEngine<InMemoryLedger> {
    /// Engine over an empty in-memory ledger with the simulated executor
    pub fn from_config(config: &NodeConfig, now: Timestamp) -> EngineResult<Self> {
        let executor = match config.engine.executor_seed {
            Some(seed) => SimulatedExecutor::new(seed),
            None => SimulatedExecutor::new_random(),
        };
        Self::new(config, InMemoryLedger::new(), Box::new(executor), now)
    }
}

impl<L: TokenLedger> HopMeshEngine<L> {
    pub fn new(
        config: &NodeConfig,
        ledger: L,
        executor: Box<dyn TransferExecutor + Send>,
        now: Timestamp,
    ) -> EngineResult<Self> {
        let consensus = HopConsensus::new(
            config.consensus.clone(),
            config.engine.shard_count,
            config.engine.shard_capacity,
        )?;
        let economics = EconomicsController::new(config.economics.clone())?;
        let mut routing = RouteOptimizer::new(config.routing.clone())?;
        for network in &config.networks {
            routing.add_network(network.clone(), now);
        }
        let rewards = RewardDistributor::new(Amount::from_u64(config.engine.initial_reward_pool));

        tracing::info!(
            "Engine initialized: admin {}, {} networks, reward pool {}",
            config.engine.admin,
            config.networks.len(),
            config.engine.initial_reward_pool
        );

        Ok(Self {
            admin: config.engine.admin,
            guard: ReentrancyGuard::new(),
            state: RefCell::new(EngineState {
                consensus,
                economics,
                rewards,
                routing,
                health: NetworkHealthStore::new(),
                executor,
                ledger,
                events: Vec::new(),
            }),
        })
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    fn run<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut EngineState<L>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let _scope = self.guard.enter(operation)?;
        let mut state = self.state.try_borrow_mut()
            .map_err(|_| CoreError::Reentrant(operation))?;

        let result = op(&mut *state);
        state.collect_events();
        result
    }

    fn ensure_admin(&self, ctx: &CallContext) -> EngineResult<()> {
        if ctx.caller != self.admin {
            tracing::warn!("Rejected privileged call from {}", ctx.caller);
            return Err(CoreError::Unauthorized(ctx.caller).into());
        }
        Ok(())
    }

    // ==================== VALIDATORS ====================

    /// Register the caller as a validator
    pub fn register_validator(&self, ctx: &CallContext, device_fingerprint: Hash) -> EngineResult<ShardId> {
        self.run("register_validator", |state| {
            Ok(state.consensus.register_validator(ctx, device_fingerprint)?)
        })
    }

    pub fn authorize_validator(&self, ctx: &CallContext, validator: &Address, power: u16) -> EngineResult<()> {
        self.run("authorize_validator", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.consensus.authorize_validator(validator, power)?)
        })
    }

    pub fn deauthorize_validator(&self, ctx: &CallContext, validator: &Address) -> EngineResult<()> {
        self.run("deauthorize_validator", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.consensus.deauthorize_validator(validator)?)
        })
    }

    /// Blacklist a validator (admin); returns the open proofs this failed
    pub fn blacklist_validator(&self, ctx: &CallContext, validator: &Address) -> EngineResult<Vec<Hash>> {
        self.run("blacklist_validator", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.consensus.blacklist_validator(validator, ctx.now)?)
        })
    }

    pub fn validator(&self, address: &Address) -> EngineResult<Option<ValidatorNode>> {
        self.run("validator", |state| Ok(state.consensus.registry().get(address).cloned()))
    }

    // ==================== CONSENSUS ====================

    /// Charge the dynamic fee and open a consensus proof.
    ///
    /// A transaction with a live or paid proof is refused before charging.
    /// The fee goes into the reward pool once the proof exists and is
    /// refunded when initiation fails.
    pub fn initiate_consensus_proof(
        &self,
        ctx: &CallContext,
        tx_hash: Hash,
        required_validators: usize,
        cross_network: bool,
    ) -> EngineResult<Hash> {
        self.run("initiate_consensus_proof", |state| {
            if state.is_halted() {
                return Err(ConsensusError::EmergencyHalt.into());
            }
            if state.rewards.is_processed(&tx_hash) {
                return Err(ConsensusError::DuplicateTransaction(tx_hash).into());
            }
            state.consensus.ensure_transaction_open(&tx_hash)?;

            let fee = state.economics.dynamic_fee();
            state.ledger.debit(&ctx.caller, fee)?;

            let request = ProofRequest {
                tx_hash,
                required_validators,
                fee,
                cross_network,
            };
            match state.consensus.initiate(ctx, request) {
                Ok(proof_id) => {
                    state.rewards.fund_pool(fee);
                    Ok(proof_id)
                }
                Err(e) => {
                    state.ledger.credit(&ctx.caller, fee)?;
                    Err(e.into())
                }
            }
        })
    }

    /// Record a hop; a proof reaching consensus pays its hosts right away.
    ///
    /// A failed payout does not undo consensus. It is logged and can be
    /// retried with [`HopMeshEngine::distribute_reward`].
    pub fn submit_hop_validation(
        &self,
        ctx: &CallContext,
        proof_id: &Hash,
        hop_index: usize,
        attestation: Hash,
    ) -> EngineResult<HopOutcome> {
        self.run("submit_hop_validation", |state| {
            let outcome = state.consensus.submit_hop(ctx, proof_id, hop_index, attestation)?;

            if let HopOutcome::Reached(receipt) = &outcome {
                match state.rewards.distribute_for_consensus(
                    receipt,
                    state.consensus.registry(),
                    &state.economics,
                    ctx.now,
                ) {
                    Ok(report) => tracing::debug!(
                        "Proof {} paid {} to {} hosts",
                        proof_id,
                        report.total_credited(),
                        report.credited.len()
                    ),
                    Err(e) => tracing::warn!("Reward distribution for proof {} failed: {}", proof_id, e),
                }
            }
            Ok(outcome)
        })
    }

    pub fn get_consensus_proof(&self, proof_id: &Hash) -> EngineResult<Option<ConsensusProof>> {
        self.run("get_consensus_proof", |state| Ok(state.consensus.get_proof(proof_id).cloned()))
    }

    /// Distribute the rewards of a reached proof (admin). Replays are rejected.
    pub fn distribute_reward(&self, ctx: &CallContext, proof_id: &Hash) -> EngineResult<DistributionReport> {
        self.run("distribute_reward", |state| {
            self.ensure_admin(ctx)?;
            let receipt = state.consensus.receipt(proof_id)?;
            Ok(state.rewards.distribute_for_consensus(
                &receipt,
                state.consensus.registry(),
                &state.economics,
                ctx.now,
            )?)
        })
    }

    // ==================== REWARDS ====================

    /// Pay the caller's pending rewards through the ledger
    pub fn claim_reward(&self, ctx: &CallContext) -> EngineResult<Amount> {
        self.run("claim_reward", |state| {
            Ok(state.rewards.claim(&ctx.caller, &mut state.ledger)?)
        })
    }

    /// Move tokens from the caller into the reward pool
    pub fn fund_reward_pool(&self, ctx: &CallContext, amount: Amount) -> EngineResult<()> {
        self.run("fund_reward_pool", |state| {
            state.ledger.debit(&ctx.caller, amount)?;
            state.rewards.fund_pool(amount);
            Ok(())
        })
    }

    pub fn pending_reward(&self, host: &Address) -> EngineResult<Amount> {
        self.run("pending_reward", |state| Ok(state.rewards.pending(host)))
    }

    pub fn balance_of(&self, account: &Address) -> EngineResult<Amount> {
        self.run("balance_of", |state| Ok(state.ledger.balance(account)))
    }

    // ==================== ROUTING ====================

    /// Charge the dynamic fee and calculate a route. Refunded on rejection.
    pub fn request_route(&self, ctx: &CallContext, spec: RouteSpec) -> EngineResult<Hash> {
        self.run("request_route", |state| {
            if state.is_halted() {
                return Err(RoutingError::Halted.into());
            }

            let fee = state.economics.dynamic_fee();
            state.ledger.debit(&ctx.caller, fee)?;

            match state.routing.request_route(ctx, spec, fee, &state.health) {
                Ok(request_id) => {
                    state.rewards.fund_pool(fee);
                    Ok(request_id)
                }
                Err(e) => {
                    state.ledger.credit(&ctx.caller, fee)?;
                    Err(e.into())
                }
            }
        })
    }

    /// Execute a route (sender or admin). Completed routes feed the volume
    /// and pay the destination's relay host.
    pub fn execute_route(&self, ctx: &CallContext, request_id: &Hash) -> EngineResult<RouteOutcome> {
        self.run("execute_route", |state| {
            let sender = state.routing.request(request_id)
                .map(|r| r.sender)
                .ok_or(RoutingError::RequestNotFound(*request_id))?;
            if ctx.caller != sender && ctx.caller != self.admin {
                return Err(CoreError::Unauthorized(ctx.caller).into());
            }

            let outcome = state.routing.execute_route(
                ctx,
                request_id,
                &state.economics,
                &mut state.health,
                state.executor.as_mut(),
            )?;

            match &outcome {
                RouteOutcome::Completed {
                    request_id,
                    latency_ms,
                    amount,
                    fee,
                    relay_host,
                    ..
                } => {
                    state.economics.record_volume(*amount, ctx.now);
                    if let Some(host) = relay_host {
                        let relay = RelayCompletion {
                            request_id: *request_id,
                            host: *host,
                            fee: *fee,
                            routed: *amount,
                            latency_ms: *latency_ms,
                        };
                        if let Err(e) = state.rewards.distribute_relay(&relay, &state.economics, ctx.now) {
                            tracing::warn!("Relay reward for {} failed: {}", request_id, e);
                        }
                    }
                }
                RouteOutcome::Failed {
                    relay_host: Some(host),
                    ..
                } => state.rewards.record_relay_failure(*host),
                _ => {}
            }
            Ok(outcome)
        })
    }

    pub fn route_request(&self, request_id: &Hash) -> EngineResult<Option<RouteRequest>> {
        self.run("route_request", |state| Ok(state.routing.request(request_id).cloned()))
    }

    // ==================== ADMIN ====================

    pub fn update_consensus_params(&self, ctx: &CallContext, params: ConsensusParams) -> EngineResult<()> {
        self.run("update_consensus_params", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.consensus.update_params(params)?)
        })
    }

    pub fn update_economic_config(&self, ctx: &CallContext, config: EconomicConfig) -> EngineResult<()> {
        self.run("update_economic_config", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.economics.update_config(config)?)
        })
    }

    pub fn update_route_config(&self, ctx: &CallContext, config: RouteConfig) -> EngineResult<()> {
        self.run("update_route_config", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.routing.update_config(config)?)
        })
    }

    pub fn set_throttle_mode(&self, ctx: &CallContext, mode: ThrottleMode) -> EngineResult<()> {
        self.run("set_throttle_mode", |state| {
            self.ensure_admin(ctx)?;
            state.routing.set_throttle_mode(mode);
            Ok(())
        })
    }

    pub fn activate_emergency_mode(&self, ctx: &CallContext, level: EmergencyLevel) -> EngineResult<()> {
        self.run("activate_emergency_mode", |state| {
            self.ensure_admin(ctx)?;
            state.economics.activate_emergency(level);
            state.sync_emergency();
            Ok(())
        })
    }

    pub fn deactivate_emergency_mode(&self, ctx: &CallContext) -> EngineResult<()> {
        self.run("deactivate_emergency_mode", |state| {
            self.ensure_admin(ctx)?;
            state.economics.deactivate_emergency();
            state.sync_emergency();
            Ok(())
        })
    }

    /// Feed a liquidity observation; returns the new health index
    pub fn update_liquidity(
        &self,
        ctx: &CallContext,
        participants: u64,
        volume: u64,
        reserve: u64,
    ) -> EngineResult<PerMille> {
        self.run("update_liquidity", |state| {
            self.ensure_admin(ctx)?;
            let health = state.economics.update_liquidity(participants, volume, reserve, ctx.now);
            state.sync_emergency();
            Ok(health)
        })
    }

    pub fn update_volatility(
        &self,
        ctx: &CallContext,
        market_pressure: PerMille,
        price_volatility: PerMille,
    ) -> EngineResult<()> {
        self.run("update_volatility", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.economics.update_volatility(market_pressure, price_volatility, ctx.now)?)
        })
    }

    pub fn record_volume(&self, ctx: &CallContext, amount: Amount) -> EngineResult<()> {
        self.run("record_volume", |state| {
            self.ensure_admin(ctx)?;
            state.economics.record_volume(amount, ctx.now);
            Ok(())
        })
    }

    pub fn add_network(&self, ctx: &CallContext, network: SupportedNetwork) -> EngineResult<()> {
        self.run("add_network", |state| {
            self.ensure_admin(ctx)?;
            state.routing.add_network(network, ctx.now);
            Ok(())
        })
    }

    pub fn set_network_active(&self, ctx: &CallContext, network: NetworkId, active: bool) -> EngineResult<()> {
        self.run("set_network_active", |state| {
            self.ensure_admin(ctx)?;
            Ok(state.routing.set_network_active(network, active)?)
        })
    }

    /// Overwrite a network's health from an external monitor and recompute
    /// the throttle mode
    pub fn observe_network(
        &self,
        ctx: &CallContext,
        network: NetworkId,
        success_rate: PerMille,
        avg_latency_ms: u64,
    ) -> EngineResult<ThrottleMode> {
        self.run("observe_network", |state| {
            self.ensure_admin(ctx)?;
            state.health.observe(network, success_rate, avg_latency_ms, ctx.now);
            Ok(state.routing.refresh_throttle_mode(&state.health))
        })
    }

    pub fn set_capacity_utilization(
        &self,
        ctx: &CallContext,
        network: NetworkId,
        utilization: PerMille,
    ) -> EngineResult<()> {
        self.run("set_capacity_utilization", |state| {
            self.ensure_admin(ctx)?;
            state.health.set_capacity_utilization(network, utilization, ctx.now);
            Ok(())
        })
    }

    // ==================== MAINTENANCE ====================

    /// Expire abandoned proofs and time out stale route requests
    pub fn sweep(&self, now: Timestamp) -> EngineResult<SweepReport> {
        self.run("sweep", |state| {
            Ok(SweepReport {
                expired_proofs: state.consensus.sweep_expired(now),
                timed_out_routes: state.routing.sweep_timeouts(now),
            })
        })
    }

    /// Take every event emitted since the last drain, oldest first
    pub fn drain_events(&self) -> EngineResult<Vec<EngineEvent>> {
        self.run("drain_events", |state| Ok(std::mem::take(&mut state.events)))
    }

    pub fn status(&self) -> EngineResult<EngineStatus> {
        self.run("status", |state| {
            let registry = state.consensus.registry();
            let (success_rate, avg_latency_ms) = state.health.aggregate();
            Ok(EngineStatus {
                validators: registry.count(),
                active_validators: registry.active_count(),
                shards: state.consensus.shards().len(),
                proofs: state.consensus.status_counts(),
                routes: state.routing.status_counts(),
                avg_consensus_time: state.consensus.avg_consensus_time(),
                throttle_mode: state.routing.throttle_mode(),
                emergency_level: state.economics.emergency_level(),
                liquidity_health: state.economics.liquidity().health_index,
                dynamic_fee: state.economics.dynamic_fee(),
                reward_pool: state.rewards.pool_balance(),
                success_rate,
                avg_latency_ms,
            })
        })
    }
}
