// economics/src/rewards.rs

use crate::controller::EconomicsController;
use crate::metrics::HostPerformance;
use crate::{EconomicsError, EconomicsResult};
use consensus::{ConsensusReceipt, ValidatorRegistry};
use mesh_core::fixed::SCALE;
use mesh_core::{Amount, EngineEvent, EventOutbox, PerMille, Timestamp, TokenLedger};
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const SECONDS_PER_DAY: u64 = 86_400;

/// Reputation change of a relay host per completed or failed route
const RELAY_REPUTATION_GAIN: PerMille = 5;
const RELAY_REPUTATION_PENALTY: PerMille = 20;

/// Per-host reward bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRewardAccount {
    pub host: Address,
    pub total_earned: Amount,
    /// Value routed through this host as a relay
    pub total_routed: Amount,
    pub success_count: u64,
    pub fail_count: u64,
    /// Sum of reported latencies, for the long-run average
    pub latency_accumulator: u64,
    /// 0-1000
    pub reputation_score: PerMille,
    /// Distributed but not yet claimed
    pub pending_rewards: Amount,
    /// Day of `earned_today`
    pub day: u64,
    pub earned_today: Amount,
}

impl HostRewardAccount {
    pub fn new(host: Address) -> Self {
        Self {
            host,
            total_earned: Amount::zero(),
            total_routed: Amount::zero(),
            success_count: 0,
            fail_count: 0,
            latency_accumulator: 0,
            reputation_score: 500,
            pending_rewards: Amount::zero(),
            day: 0,
            earned_today: Amount::zero(),
        }
    }

    /// Long-run mean latency, 0 without history
    pub fn historical_latency(&self) -> u64 {
        if self.success_count == 0 {
            0
        } else {
            self.latency_accumulator / self.success_count
        }
    }

    pub fn success_rate(&self) -> PerMille {
        let total = self.success_count.saturating_add(self.fail_count);
        if total == 0 {
            SCALE
        } else {
            self.success_count.saturating_mul(SCALE) / total
        }
    }

    fn earned_on(&self, day: u64) -> Amount {
        if self.day == day {
            self.earned_today
        } else {
            Amount::zero()
        }
    }
}

/// What a reward was paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    Consensus,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub tx_id: Hash,
    pub host: Address,
    pub amount: Amount,
    pub kind: RewardKind,
    pub timestamp: Timestamp,
}

/// A completed route whose relay host earns a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCompletion {
    pub request_id: Hash,
    pub host: Address,
    /// Fee the route was charged
    pub fee: Amount,
    /// Value moved through the relay
    pub routed: Amount,
    pub latency_ms: u64,
}

/// Outcome of one distribution call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub credited: Vec<(Address, Amount)>,
    /// Rewards refused by the daily cap
    pub rejected: Vec<(Address, Amount)>,
}

impl DistributionReport {
    pub fn total_credited(&self) -> Amount {
        self.credited.iter().map(|(_, a)| *a).sum()
    }
}

/// Turns consensus and relay outcomes into host rewards.
///
/// Rewards move from the pool into per-host pending balances and leave
/// through [`RewardDistributor::claim`].
#[derive(Debug, Default)]
pub struct RewardDistributor {
    pool: Amount,
    accounts: HashMap<Address, HostRewardAccount>,
    processed: HashSet<Hash>,
    history: Vec<RewardRecord>,
    outbox: EventOutbox,
}

impl RewardDistributor {
    pub fn new(initial_pool: Amount) -> Self {
        Self {
            pool: initial_pool,
            ..Self::default()
        }
    }

    pub fn pool_balance(&self) -> Amount {
        self.pool
    }

    /// Add collected fees to the pool
    pub fn fund_pool(&mut self, amount: Amount) {
        self.pool = self.pool.saturating_add(amount);
    }

    pub fn account(&self, host: &Address) -> Option<&HostRewardAccount> {
        self.accounts.get(host)
    }

    pub fn pending(&self, host: &Address) -> Amount {
        self.accounts.get(host)
            .map(|a| a.pending_rewards)
            .unwrap_or_default()
    }

    pub fn is_processed(&self, tx_id: &Hash) -> bool {
        self.processed.contains(tx_id)
    }

    pub fn history(&self) -> &[RewardRecord] {
        &self.history
    }

    /// Remaining daily allowance check. The cap is a share of the pool at call time.
    fn check_daily_cap(
        &self,
        host: &Address,
        reward: Amount,
        already: Amount,
        cap: Amount,
        day: u64,
    ) -> EconomicsResult<()> {
        let earned = self.accounts.get(host)
            .map(|a| a.earned_on(day))
            .unwrap_or_default()
            .saturating_add(already);
        if earned.saturating_add(reward) > cap {
            return Err(EconomicsError::DailyCapExceeded {
                host: *host,
                earned,
                cap,
            });
        }
        Ok(())
    }

    fn credit_host(&mut self, host: Address, amount: Amount, day: u64) -> &mut HostRewardAccount {
        let account = self.accounts.entry(host)
            .or_insert_with(|| HostRewardAccount::new(host));
        if account.day != day {
            account.day = day;
            account.earned_today = Amount::zero();
        }
        account.earned_today = account.earned_today.saturating_add(amount);
        account.total_earned = account.total_earned.saturating_add(amount);
        account.pending_rewards = account.pending_rewards.saturating_add(amount);
        account
    }

    /// Split a reached proof's fee over the hosts that attested
    pub fn distribute_for_consensus(
        &mut self,
        receipt: &ConsensusReceipt,
        registry: &ValidatorRegistry,
        controller: &EconomicsController,
        now: Timestamp,
    ) -> EconomicsResult<DistributionReport> {
        let tx_id = receipt.tx_hash;
        if self.processed.contains(&tx_id) {
            return Err(EconomicsError::AlreadyProcessed(tx_id));
        }

        let day = now / SECONDS_PER_DAY;
        let cap = self.pool.scale(controller.config().daily_cap_per_mille);
        let mut report = DistributionReport::default();
        let mut planned: HashMap<Address, Amount> = HashMap::new();

        for (_, host) in &receipt.responders {
            let performance = match registry.get(host) {
                Some(node) => HostPerformance {
                    success_rate: node.success_rate,
                    latency_ms: node.avg_latency_ms,
                    historical_latency_ms: self.accounts.get(host)
                        .map(|a| a.historical_latency())
                        .unwrap_or(0),
                    reputation: node.reputation,
                },
                None => HostPerformance::default(),
            };
            let reward = controller.hop_reward(
                receipt.fee,
                receipt.path_len,
                receipt.cross_network,
                &performance,
            );

            let already = planned.get(host).copied().unwrap_or_default();
            match self.check_daily_cap(host, reward, already, cap, day) {
                Ok(()) => {
                    planned.insert(*host, already.saturating_add(reward));
                    report.credited.push((*host, reward));
                }
                Err(e) => {
                    tracing::warn!("Reward for {} rejected: {}", host, e);
                    report.rejected.push((*host, reward));
                }
            }
        }

        let total = report.total_credited();
        if total > self.pool {
            return Err(EconomicsError::InsufficientPool {
                required: total,
                available: self.pool,
            });
        }

        self.processed.insert(tx_id);
        self.pool = self.pool.saturating_sub(total);

        for (host, amount) in &report.credited {
            let latency = registry.get(host).map(|n| n.avg_latency_ms).unwrap_or(0);
            let reputation = registry.get(host).map(|n| n.reputation);
            let account = self.credit_host(*host, *amount, day);
            account.success_count = account.success_count.saturating_add(1);
            account.latency_accumulator = account.latency_accumulator.saturating_add(latency);
            if let Some(reputation) = reputation {
                account.reputation_score = reputation;
            }

            self.history.push(RewardRecord {
                tx_id,
                host: *host,
                amount: *amount,
                kind: RewardKind::Consensus,
                timestamp: now,
            });
            self.outbox.emit(EngineEvent::RewardDistributed {
                tx_id,
                host: *host,
                amount: *amount,
            });
        }
        for (host, amount) in &report.rejected {
            self.outbox.emit(EngineEvent::RewardRejected {
                tx_id,
                host: *host,
                amount: *amount,
            });
        }

        tracing::info!(
            "Distributed {} for tx {} to {} hosts ({} rejected)",
            total,
            tx_id,
            report.credited.len(),
            report.rejected.len()
        );
        Ok(report)
    }

    /// Pay a relay host for a completed route
    pub fn distribute_relay(
        &mut self,
        relay: &RelayCompletion,
        controller: &EconomicsController,
        now: Timestamp,
    ) -> EconomicsResult<DistributionReport> {
        let RelayCompletion { request_id, host, fee, routed, latency_ms } = *relay;
        if self.processed.contains(&request_id) {
            return Err(EconomicsError::AlreadyProcessed(request_id));
        }

        let performance = self.accounts.get(&host)
            .map(|a| HostPerformance {
                success_rate: a.success_rate(),
                latency_ms,
                historical_latency_ms: a.historical_latency(),
                reputation: a.reputation_score,
            })
            .unwrap_or_default();
        let reward = controller.host_reward(fee, true, &performance);

        let day = now / SECONDS_PER_DAY;
        let cap = self.pool.scale(controller.config().daily_cap_per_mille);
        let mut report = DistributionReport::default();

        let accepted = match self.check_daily_cap(&host, reward, Amount::zero(), cap, day) {
            Ok(()) if reward <= self.pool => true,
            Ok(()) => {
                return Err(EconomicsError::InsufficientPool {
                    required: reward,
                    available: self.pool,
                })
            }
            Err(e) => {
                tracing::warn!("Relay reward for {} rejected: {}", host, e);
                false
            }
        };

        self.processed.insert(request_id);

        if accepted {
            self.pool = self.pool.saturating_sub(reward);
            let account = self.credit_host(host, reward, day);
            account.total_routed = account.total_routed.saturating_add(routed);
            account.success_count = account.success_count.saturating_add(1);
            account.latency_accumulator = account.latency_accumulator.saturating_add(latency_ms);
            account.reputation_score = account.reputation_score
                .saturating_add(RELAY_REPUTATION_GAIN)
                .min(SCALE);

            self.history.push(RewardRecord {
                tx_id: request_id,
                host,
                amount: reward,
                kind: RewardKind::Relay,
                timestamp: now,
            });
            self.outbox.emit(EngineEvent::RewardDistributed {
                tx_id: request_id,
                host,
                amount: reward,
            });
            report.credited.push((host, reward));
        } else {
            self.outbox.emit(EngineEvent::RewardRejected {
                tx_id: request_id,
                host,
                amount: reward,
            });
            report.rejected.push((host, reward));
        }

        Ok(report)
    }

    /// Charge a relay host for a failed route
    pub fn record_relay_failure(&mut self, host: Address) {
        let account = self.accounts.entry(host)
            .or_insert_with(|| HostRewardAccount::new(host));
        account.fail_count = account.fail_count.saturating_add(1);
        account.reputation_score = account.reputation_score.saturating_sub(RELAY_REPUTATION_PENALTY);
    }

    /// Pay out a host's pending rewards through the ledger
    pub fn claim<L: TokenLedger>(&mut self, host: &Address, ledger: &mut L) -> EconomicsResult<Amount> {
        let account = self.accounts.get_mut(host)
            .ok_or(EconomicsError::HostNotFound(*host))?;
        if account.pending_rewards.is_zero() {
            return Err(EconomicsError::NothingToClaim(*host));
        }

        let amount = account.pending_rewards;
        ledger.credit(host, amount)?;
        account.pending_rewards = Amount::zero();

        tracing::info!("Host {} claimed {}", host, amount);
        self.outbox.emit(EngineEvent::RewardClaimed { host: *host, amount });
        Ok(amount)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.outbox.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomicConfig;
    use mesh_core::InMemoryLedger;

    fn controller() -> EconomicsController {
        EconomicsController::new(EconomicConfig::default()).unwrap()
    }

    fn receipt(tx: u8, hosts: &[u64], path_len: usize, fee: u64) -> ConsensusReceipt {
        ConsensusReceipt {
            proof_id: Hash::new([tx.wrapping_add(100); 32]),
            tx_hash: Hash::new([tx; 32]),
            path_len,
            responders: hosts.iter()
                .enumerate()
                .map(|(i, h)| (i, Address::from_low_u64(*h)))
                .collect(),
            score: 800,
            validation_time: 10,
            fee: Amount::from_u64(fee),
            cross_network: false,
        }
    }

    #[test]
    fn test_distribution_splits_fee_per_hop() {
        let mut distributor = RewardDistributor::new(Amount::from_u64(10_000_000));
        let registry = ValidatorRegistry::new();
        let report = distributor
            .distribute_for_consensus(&receipt(1, &[1, 2, 3, 4], 5, 10_000), &registry, &controller(), 100)
            .unwrap();

        // 10_000 * 0.7 / 5 = 1400, neutral multiplier 1.85
        assert_eq!(report.credited.len(), 4);
        assert!(report.credited.iter().all(|(_, a)| *a == Amount::from_u64(2590)));
        assert_eq!(distributor.pool_balance(), Amount::from_u64(10_000_000 - 4 * 2590));
        assert_eq!(distributor.pending(&Address::from_low_u64(1)), Amount::from_u64(2590));
    }

    #[test]
    fn test_replay_has_no_effect() {
        let mut distributor = RewardDistributor::new(Amount::from_u64(10_000_000));
        let registry = ValidatorRegistry::new();
        let r = receipt(1, &[1, 2, 3], 3, 3000);

        distributor.distribute_for_consensus(&r, &registry, &controller(), 100).unwrap();
        let pool = distributor.pool_balance();
        let pending = distributor.pending(&Address::from_low_u64(1));

        assert_eq!(
            distributor.distribute_for_consensus(&r, &registry, &controller(), 101).unwrap_err(),
            EconomicsError::AlreadyProcessed(r.tx_hash)
        );
        assert_eq!(distributor.pool_balance(), pool);
        assert_eq!(distributor.pending(&Address::from_low_u64(1)), pending);
    }

    #[test]
    fn test_daily_cap_rejects_without_partial_credit() {
        // 1% of 200_000 = 2000 per host per day; one hop earns 1295
        let mut distributor = RewardDistributor::new(Amount::from_u64(200_000));
        let registry = ValidatorRegistry::new();
        let c = controller();

        let first = distributor
            .distribute_for_consensus(&receipt(1, &[1], 1, 1000), &registry, &c, 100)
            .unwrap();
        assert_eq!(first.credited, vec![(Address::from_low_u64(1), Amount::from_u64(1295))]);

        let second = distributor
            .distribute_for_consensus(&receipt(2, &[1], 1, 1000), &registry, &c, 200)
            .unwrap();
        assert!(second.credited.is_empty());
        assert_eq!(second.rejected.len(), 1);
        assert_eq!(distributor.pending(&Address::from_low_u64(1)), Amount::from_u64(1295));

        // Next day the allowance is back
        let third = distributor
            .distribute_for_consensus(&receipt(3, &[1], 1, 1000), &registry, &c, SECONDS_PER_DAY + 1)
            .unwrap();
        assert_eq!(third.credited.len(), 1);
    }

    #[test]
    fn test_insufficient_pool() {
        // Cap equals the whole pool; each of two hops fits, both together do not
        let mut distributor = RewardDistributor::new(Amount::from_u64(100));
        let mut c = controller();
        c.update_config(EconomicConfig {
            daily_cap_per_mille: 1000,
            ..EconomicConfig::default()
        })
        .unwrap();

        let registry = ValidatorRegistry::new();
        let r = receipt(1, &[1, 2], 2, 93);
        assert_eq!(
            distributor.distribute_for_consensus(&r, &registry, &c, 0).unwrap_err(),
            EconomicsError::InsufficientPool {
                required: Amount::from_u64(118),
                available: Amount::from_u64(100),
            }
        );
        assert_eq!(distributor.pool_balance(), Amount::from_u64(100));
        assert!(!distributor.is_processed(&r.tx_hash));
    }

    #[test]
    fn test_claim_moves_pending_to_ledger() {
        let mut distributor = RewardDistributor::new(Amount::from_u64(10_000_000));
        let registry = ValidatorRegistry::new();
        distributor
            .distribute_for_consensus(&receipt(1, &[7], 1, 1000), &registry, &controller(), 0)
            .unwrap();

        let host = Address::from_low_u64(7);
        let mut ledger = InMemoryLedger::new();
        let claimed = distributor.claim(&host, &mut ledger).unwrap();
        assert_eq!(claimed, Amount::from_u64(1295));
        assert_eq!(ledger.balance(&host), claimed);

        assert_eq!(
            distributor.claim(&host, &mut ledger).unwrap_err(),
            EconomicsError::NothingToClaim(host)
        );
        assert_eq!(
            distributor.claim(&Address::from_low_u64(8), &mut ledger).unwrap_err(),
            EconomicsError::HostNotFound(Address::from_low_u64(8))
        );
    }

    #[test]
    fn test_relay_reward_tracks_routed_value() {
        let mut distributor = RewardDistributor::new(Amount::from_u64(10_000_000));
        let relay = Address::from_low_u64(9);
        let request = Hash::new([5; 32]);

        let completion = RelayCompletion {
            request_id: request,
            host: relay,
            fee: Amount::from_u64(1000),
            routed: Amount::from_u64(50_000),
            latency_ms: 300,
        };
        let report = distributor.distribute_relay(&completion, &controller(), 10).unwrap();
        // 700 * 1.85 * 1.1
        assert_eq!(report.credited, vec![(relay, Amount::from_u64(1424))]);

        let account = distributor.account(&relay).unwrap();
        assert_eq!(account.total_routed, Amount::from_u64(50_000));
        assert_eq!(account.reputation_score, 505);
        assert_eq!(
            distributor.distribute_relay(&completion, &controller(), 11).unwrap_err(),
            EconomicsError::AlreadyProcessed(request)
        );

        distributor.record_relay_failure(relay);
        let account = distributor.account(&relay).unwrap();
        assert_eq!(account.fail_count, 1);
        assert_eq!(account.reputation_score, 485);
        assert_eq!(distributor.history().len(), 1);
    }
}
