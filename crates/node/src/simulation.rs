// node/src/simulation.rs

//! Scripted end-to-end run used by the `simulate` command

use crate::config::NodeConfig;
use crate::engine::{EngineStatus, HopMeshEngine};
use crate::{EngineError, EngineResult};
use consensus::{ConsensusStatus, HopOutcome};
use economics::EconomicsError;
use mesh_core::{Amount, CallContext, InMemoryLedger, Timestamp};
use mesh_crypto::{Address, Hash, Hashable, KeyPair};
use routing::{RouteSpec, RouteStatus, SimulatedExecutor};
use serde::Serialize;

/// Balance given to the simulated user
const USER_FUNDS: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub proof_id: Hash,
    pub proof_status: ConsensusStatus,
    pub route_status: Option<RouteStatus>,
    pub claimed: Vec<(Address, Amount)>,
    pub user_balance: Amount,
    pub status: EngineStatus,
}

fn validator_keys(count: usize) -> Vec<KeyPair> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
            KeyPair::from_seed(seed)
        })
        .collect()
}

/// Register validators, reach consensus on one transaction, route one
/// transfer to the first configured network and claim every reward.
pub fn run(config: &NodeConfig, validators: usize, start: Timestamp) -> EngineResult<SimulationReport> {
    let user = Address::from_low_u64(0xface);
    let ledger = InMemoryLedger::with_balance(user, Amount::from_u64(USER_FUNDS));
    let executor = SimulatedExecutor::new(config.engine.executor_seed.unwrap_or(7));
    let engine = HopMeshEngine::new(config, ledger, Box::new(executor), start)?;

    let admin = CallContext::new(config.engine.admin, start);
    let keys = validator_keys(validators);
    for key in &keys {
        let ctx = CallContext::new(key.address(), start);
        let shard = engine.register_validator(&ctx, key.device_fingerprint())?;
        engine.authorize_validator(&admin, &key.address(), 100)?;
        tracing::debug!("Validator {} seated in shard {}", key.address(), shard);
    }

    let user_ctx = CallContext::new(user, start + 1);
    let proof_id = engine.initiate_consensus_proof(
        &user_ctx,
        b"simulated-transfer".hash(),
        config.consensus.optimal_validators,
        true,
    )?;

    let path = engine.get_consensus_proof(&proof_id)?
        .map(|p| p.path)
        .unwrap_or_default();
    let mut now = start + 1;
    for (hop, validator) in path.iter().enumerate() {
        now += 1;
        let ctx = CallContext::new(*validator, now);
        let message = Hash::of_parts(&[proof_id.as_bytes(), &(hop as u64).to_be_bytes()]);
        let attestation = match keys.iter().find(|k| k.address() == *validator) {
            Some(key) => key.attest(message.as_bytes()),
            None => message,
        };
        match engine.submit_hop_validation(&ctx, &proof_id, hop, attestation)? {
            HopOutcome::Validating { .. } => continue,
            _ => break,
        }
    }
    let proof_status = engine.get_consensus_proof(&proof_id)?
        .map(|p| p.status)
        .unwrap_or(ConsensusStatus::Pending);

    let route_status = match config.networks.first() {
        Some(network) => {
            let spec = RouteSpec {
                target_network: network.id,
                amount: Amount::from_u64(10_000),
                max_cost: 0,
                max_latency_ms: 0,
                priority: 5,
            };
            let request_id = engine.request_route(&user_ctx.at(now), spec)?;
            engine.execute_route(&user_ctx.at(now + 1), &request_id)?;
            engine.route_request(&request_id)?.map(|r| r.status)
        }
        None => None,
    };

    let mut claimed = Vec::new();
    let mut hosts: Vec<Address> = keys.iter().map(|k| k.address()).collect();
    hosts.extend(config.networks.iter().filter_map(|n| n.relay_host));
    for host in hosts {
        match engine.claim_reward(&CallContext::new(host, now + 2)) {
            Ok(amount) => claimed.push((host, amount)),
            Err(EngineError::Economics(EconomicsError::HostNotFound(_)))
            | Err(EngineError::Economics(EconomicsError::NothingToClaim(_))) => {}
            Err(e) => return Err(e),
        }
    }

    let events = engine.drain_events()?;
    tracing::info!("Simulation emitted {} events", events.len());

    Ok(SimulationReport {
        proof_id,
        proof_status,
        route_status,
        claimed,
        user_balance: engine.balance_of(&user)?,
        status: engine.status()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_reaches_consensus() {
        let mut config = NodeConfig::default();
        config.engine.executor_seed = Some(1);

        let report = run(&config, 6, 1_700_000_000).unwrap();
        assert_eq!(report.proof_status, ConsensusStatus::ConsensusReached);
        assert_eq!(report.route_status, Some(RouteStatus::Completed));
        assert!(!report.claimed.is_empty());
        assert!(report.user_balance < Amount::from_u64(USER_FUNDS));
        assert_eq!(report.status.active_validators, 6);
    }
}
