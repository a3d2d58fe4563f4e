// consensus/src/hop.rs

//! Hop consensus state machine
//!
//! PENDING -> VALIDATING -> {CONSENSUS_REACHED | CONSENSUS_FAILED | EXPIRED}
//!
//! Deadlines are checked lazily when a hop touches its proof. `sweep_expired`
//! closes proofs nobody touches any more.

use crate::proof::{ConsensusParams, ConsensusProof, ConsensusStatus, Evaluation, MAX_PATH_LENGTH};
use crate::selection::PathSelector;
use crate::shard::ShardAllocator;
use crate::validator::ValidatorRegistry;
use crate::{ConsensusError, ConsensusResult};
use mesh_core::fixed::ema;
use mesh_core::{
    Amount, CallContext, EmergencyLevel, EngineEvent, EventOutbox, PerMille, ShardId, Timestamp,
};
use mesh_crypto::{Address, Hash};
use std::collections::HashMap;

/// Request to start a consensus proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub tx_hash: Hash,
    pub required_validators: usize,
    /// Fee already collected from the initiator
    pub fee: Amount,
    pub cross_network: bool,
}

/// What a hop submission did to its proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopOutcome {
    /// Recorded; more hops needed
    Validating { score: PerMille },
    /// Recorded and the proof reached consensus
    Reached(ConsensusReceipt),
    /// Recorded; the hops still able to arrive cannot reach the threshold
    Failed { score: PerMille },
    /// Deadline passed; the hop was not recorded
    Expired,
}

/// Handed to reward distribution when a proof reaches consensus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusReceipt {
    pub proof_id: Hash,
    pub tx_hash: Hash,
    pub path_len: usize,
    /// Hop index and validator of every attested hop
    pub responders: Vec<(usize, Address)>,
    pub score: PerMille,
    pub validation_time: u64,
    pub fee: Amount,
    pub cross_network: bool,
}

/// Hop-based consensus over a sharded validator set
#[derive(Debug)]
pub struct HopConsensus {
    params: ConsensusParams,
    registry: ValidatorRegistry,
    shards: ShardAllocator,
    selector: PathSelector,
    proofs: HashMap<Hash, ConsensusProof>,
    /// Latest proof opened for each transaction
    tx_proofs: HashMap<Hash, Hash>,
    emergency: EmergencyLevel,
    /// Global consensus time EMA in seconds
    avg_consensus_time: u64,
    proof_nonce: u64,
    outbox: EventOutbox,
}

impl HopConsensus {
    pub fn new(params: ConsensusParams, shard_count: u16, shard_capacity: usize) -> ConsensusResult<Self> {
        params.validate()?;
        if shard_count == 0 || shard_capacity == 0 {
            return Err(ConsensusError::InvalidParams(
                "shard count and capacity must be positive".into(),
            ));
        }

        tracing::info!(
            "Hop consensus initialized: {} shards of {}, threshold {}",
            shard_count,
            shard_capacity,
            params.consensus_threshold
        );

        Ok(Self {
            params,
            registry: ValidatorRegistry::new(),
            shards: ShardAllocator::new(shard_count, shard_capacity),
            selector: PathSelector::default(),
            proofs: HashMap::new(),
            tx_proofs: HashMap::new(),
            emergency: EmergencyLevel::None,
            avg_consensus_time: 0,
            proof_nonce: 0,
            outbox: EventOutbox::new(),
        })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Replace the parameters as a whole
    pub fn update_params(&mut self, params: ConsensusParams) -> ConsensusResult<()> {
        params.validate()?;
        tracing::info!("Consensus parameters replaced: {:?}", params);
        self.params = params;
        Ok(())
    }

    /// Mirror of the economics emergency level
    pub fn set_emergency_level(&mut self, level: EmergencyLevel) {
        self.emergency = level;
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn shards(&self) -> &ShardAllocator {
        &self.shards
    }

    pub fn avg_consensus_time(&self) -> u64 {
        self.avg_consensus_time
    }

    /// Register the caller as a validator and seat it in a shard
    pub fn register_validator(&mut self, ctx: &CallContext, device_fingerprint: Hash) -> ConsensusResult<ShardId> {
        if self.shards.shards().iter().all(|s| s.is_full()) {
            return Err(ConsensusError::ShardsFull(
                self.shards.shards().first().map(|s| s.capacity).unwrap_or(0),
            ));
        }

        self.registry.register(ctx.caller, device_fingerprint, ctx.now)?;
        let shard = self.shards.assign_to_optimal_shard(ctx.caller)?;
        if let Some(node) = self.registry.get_mut(&ctx.caller) {
            node.shard = Some(shard);
        }

        self.outbox.emit(EngineEvent::ValidatorRegistered {
            validator: ctx.caller,
            shard,
        });
        Ok(shard)
    }

    pub fn authorize_validator(&mut self, validator: &Address, power: u16) -> ConsensusResult<()> {
        self.registry.authorize(validator, power)?;
        self.shards.refresh_active_counts(&self.registry);
        self.outbox.emit(EngineEvent::ValidatorAuthorized {
            validator: *validator,
            power,
        });
        Ok(())
    }

    pub fn deauthorize_validator(&mut self, validator: &Address) -> ConsensusResult<()> {
        self.registry.deauthorize(validator)?;
        self.shards.refresh_active_counts(&self.registry);
        self.outbox.emit(EngineEvent::ValidatorDeauthorized { validator: *validator });
        Ok(())
    }

    /// Blacklist a validator. Open proofs that can no longer reach the
    /// threshold without its hop fail right away.
    pub fn blacklist_validator(&mut self, validator: &Address, now: Timestamp) -> ConsensusResult<Vec<Hash>> {
        self.registry.blacklist(validator)?;
        self.shards.refresh_active_counts(&self.registry);
        self.outbox.emit(EngineEvent::ValidatorDeauthorized { validator: *validator });

        let max_time = self.params.max_validation_time_secs;
        let threshold = self.params.consensus_threshold;
        let mut doomed: Vec<(Hash, PerMille)> = self.proofs.values()
            .filter(|p| !p.is_terminal() && !p.is_past_deadline(now, max_time))
            .filter(|p| p.path.contains(validator))
            .filter_map(|p| {
                let void = void_hops(p, &self.registry);
                match Evaluation::with_void(p.completed_hops(), void, p.path_len(), threshold) {
                    Evaluation::Failed { score } => Some((p.id, score)),
                    _ => None,
                }
            })
            .collect();
        doomed.sort();

        for (proof_id, score) in &doomed {
            self.finalize_failed(proof_id, *score, now)?;
        }
        Ok(doomed.into_iter().map(|(id, _)| id).collect())
    }

    /// Refuse a transaction that already has a live or settled proof.
    /// Expired and failed proofs leave the transaction open for another try.
    pub fn ensure_transaction_open(&self, tx_hash: &Hash) -> ConsensusResult<()> {
        let settled_or_live = self.tx_proofs.get(tx_hash)
            .and_then(|id| self.proofs.get(id))
            .is_some_and(|p| !matches!(p.status, ConsensusStatus::Expired | ConsensusStatus::ConsensusFailed));
        if settled_or_live {
            return Err(ConsensusError::DuplicateTransaction(*tx_hash));
        }
        Ok(())
    }

    /// Draw a validator path and open a PENDING proof
    pub fn initiate(&mut self, ctx: &CallContext, request: ProofRequest) -> ConsensusResult<Hash> {
        if self.emergency == EmergencyLevel::Halt {
            return Err(ConsensusError::EmergencyHalt);
        }
        self.ensure_transaction_open(&request.tx_hash)?;

        if request.required_validators < self.params.min_validators {
            return Err(ConsensusError::InvalidParams(format!(
                "path length {} below minimum {}",
                request.required_validators, self.params.min_validators
            )));
        }
        if request.required_validators > MAX_PATH_LENGTH {
            return Err(ConsensusError::InvalidParams(format!(
                "path length {} above {}",
                request.required_validators, MAX_PATH_LENGTH
            )));
        }

        let required = if self.emergency.is_active() {
            self.params.min_validators
        } else {
            self.params.effective_path_length(request.required_validators)
        };

        let active = self.registry.active_validators();
        if active.len() < self.params.min_validators {
            return Err(ConsensusError::InsufficientValidators {
                required,
                available: active.len(),
            });
        }

        let seed = ctx.seed(request.tx_hash.as_bytes());
        let selected = self.selector.select_path(&active, required, seed)?;

        self.proof_nonce = self.proof_nonce.wrapping_add(1);
        let proof_id = ctx.derive_id(request.tx_hash.as_bytes(), self.proof_nonce);

        let mut proof = ConsensusProof::new(
            proof_id,
            request.tx_hash,
            ctx.caller,
            selected.validators,
            request.fee,
            request.cross_network,
            ctx.now,
        );
        proof.degraded = selected.degraded;

        tracing::info!(
            "Consensus proof {} started for tx {} over {} hops",
            proof_id,
            request.tx_hash,
            proof.path_len()
        );
        self.outbox.emit(EngineEvent::ProofStarted {
            proof_id,
            tx_hash: request.tx_hash,
            path: proof.path.clone(),
        });
        self.proofs.insert(proof_id, proof);
        self.tx_proofs.insert(request.tx_hash, proof_id);

        Ok(proof_id)
    }

    /// Record the caller's attestation for its hop and evaluate the proof
    pub fn submit_hop(
        &mut self,
        ctx: &CallContext,
        proof_id: &Hash,
        hop_index: usize,
        attestation: Hash,
    ) -> ConsensusResult<HopOutcome> {
        let max_time = self.params.max_validation_time_secs;
        let threshold = self.params.consensus_threshold;

        if self.registry.get(&ctx.caller).is_some_and(|v| v.is_blacklisted) {
            return Err(ConsensusError::ValidatorBlacklisted(ctx.caller));
        }

        let proof = self.proofs.get_mut(proof_id)
            .ok_or(ConsensusError::ProofNotFound(*proof_id))?;

        if proof.is_terminal() {
            return Err(ConsensusError::ProofFinalized(*proof_id));
        }
        if hop_index >= proof.path_len() {
            return Err(ConsensusError::HopIndexOutOfRange {
                index: hop_index,
                len: proof.path_len(),
            });
        }
        if proof.path[hop_index] != ctx.caller {
            return Err(ConsensusError::NotHopOwner {
                caller: ctx.caller,
                hop_index,
            });
        }
        if !proof.hop_proofs[hop_index].is_zero() {
            return Err(ConsensusError::HopAlreadySubmitted(hop_index));
        }
        if attestation.is_zero() {
            return Err(ConsensusError::EmptyHopProof);
        }

        if proof.is_past_deadline(ctx.now, max_time) {
            proof.status = ConsensusStatus::Expired;
            tracing::warn!("Consensus proof {} expired at hop {}", proof_id, hop_index);
            self.outbox.emit(EngineEvent::ProofExpired { proof_id: *proof_id });
            return Ok(HopOutcome::Expired);
        }

        proof.hop_proofs[hop_index] = attestation;
        proof.timestamps[hop_index] = ctx.now;
        proof.status = ConsensusStatus::Validating;

        let void = void_hops(proof, &self.registry);
        let evaluation = Evaluation::with_void(proof.completed_hops(), void, proof.path_len(), threshold);
        proof.score = evaluation.score();

        tracing::debug!(
            "Hop {} of proof {} validated by {} (score {})",
            hop_index,
            proof_id,
            ctx.caller,
            proof.score
        );
        self.outbox.emit(EngineEvent::HopValidated {
            proof_id: *proof_id,
            hop_index,
            validator: ctx.caller,
            score: proof.score,
        });

        match evaluation {
            Evaluation::Validating { score } => Ok(HopOutcome::Validating { score }),
            Evaluation::Reached { score } => {
                let receipt = self.finalize_reached(proof_id, score, ctx.now)?;
                Ok(HopOutcome::Reached(receipt))
            }
            Evaluation::Failed { score } => {
                self.finalize_failed(proof_id, score, ctx.now)?;
                Ok(HopOutcome::Failed { score })
            }
        }
    }

    fn finalize_reached(&mut self, proof_id: &Hash, score: PerMille, now: Timestamp) -> ConsensusResult<ConsensusReceipt> {
        let hop_timeout_ms = self.params.hop_timeout_ms;
        let proof = self.proofs.get_mut(proof_id)
            .ok_or(ConsensusError::ProofNotFound(*proof_id))?;

        let started = proof.started_at();
        let validation_time = now.saturating_sub(started);
        proof.status = ConsensusStatus::ConsensusReached;
        proof.validation_time = Some(validation_time);

        let responders = proof.responders();
        for (index, validator) in &responders {
            let latency_ms = proof.timestamps[*index]
                .saturating_sub(proof.created_at)
                .saturating_mul(1000)
                .min(hop_timeout_ms);
            self.registry.record_success(validator, latency_ms, now);
        }

        let first_shard = proof.path.first()
            .and_then(|v| self.registry.get(v))
            .and_then(|v| v.shard);
        if let Some(shard) = first_shard {
            self.shards.record_consensus_time(shard, validation_time);
        }
        self.avg_consensus_time = ema(self.avg_consensus_time, validation_time);

        tracing::info!(
            "Consensus reached for proof {} (score {}, {}s)",
            proof_id,
            score,
            validation_time
        );
        self.outbox.emit(EngineEvent::ConsensusReached {
            proof_id: *proof_id,
            score,
            validation_time,
        });

        Ok(ConsensusReceipt {
            proof_id: *proof_id,
            tx_hash: proof.tx_hash,
            path_len: proof.path_len(),
            responders,
            score,
            validation_time,
            fee: proof.fee,
            cross_network: proof.cross_network,
        })
    }

    /// Receipt of a proof that reached consensus, for re-running distribution
    pub fn receipt(&self, proof_id: &Hash) -> ConsensusResult<ConsensusReceipt> {
        let proof = self.proofs.get(proof_id)
            .ok_or(ConsensusError::ProofNotFound(*proof_id))?;
        if proof.status != ConsensusStatus::ConsensusReached {
            return Err(ConsensusError::NotReached(*proof_id));
        }

        Ok(ConsensusReceipt {
            proof_id: *proof_id,
            tx_hash: proof.tx_hash,
            path_len: proof.path_len(),
            responders: proof.responders(),
            score: proof.score,
            validation_time: proof.validation_time.unwrap_or(0),
            fee: proof.fee,
            cross_network: proof.cross_network,
        })
    }

    fn finalize_failed(&mut self, proof_id: &Hash, score: PerMille, now: Timestamp) -> ConsensusResult<()> {
        let proof = self.proofs.get_mut(proof_id)
            .ok_or(ConsensusError::ProofNotFound(*proof_id))?;
        proof.status = ConsensusStatus::ConsensusFailed;

        for validator in &proof.path {
            self.registry.record_failure(validator, now);
        }

        tracing::warn!("Consensus failed for proof {} (score {})", proof_id, score);
        self.outbox.emit(EngineEvent::ConsensusFailed {
            proof_id: *proof_id,
            score,
        });
        Ok(())
    }

    pub fn get_proof(&self, proof_id: &Hash) -> Option<&ConsensusProof> {
        self.proofs.get(proof_id)
    }

    /// Move every open proof past its deadline to EXPIRED
    pub fn sweep_expired(&mut self, now: Timestamp) -> Vec<Hash> {
        let max_time = self.params.max_validation_time_secs;
        let mut expired = Vec::new();

        for (id, proof) in self.proofs.iter_mut() {
            if !proof.is_terminal() && proof.is_past_deadline(now, max_time) {
                proof.status = ConsensusStatus::Expired;
                expired.push(*id);
            }
        }
        expired.sort();

        for proof_id in &expired {
            self.outbox.emit(EngineEvent::ProofExpired { proof_id: *proof_id });
        }
        if !expired.is_empty() {
            tracing::info!("Expired {} abandoned consensus proofs", expired.len());
        }
        expired
    }

    /// Proof counts per status
    pub fn status_counts(&self) -> HashMap<ConsensusStatus, usize> {
        let mut counts = HashMap::new();
        for proof in self.proofs.values() {
            *counts.entry(proof.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn proof_count(&self) -> usize {
        self.proofs.len()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.outbox.drain()
    }
}

/// Empty hop slots held by blacklisted validators
fn void_hops(proof: &ConsensusProof, registry: &ValidatorRegistry) -> usize {
    proof.path.iter()
        .zip(&proof.hop_proofs)
        .filter(|(v, p)| p.is_zero() && registry.get(v).is_some_and(|n| n.is_blacklisted))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::Hashable;

    fn validator(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn setup(count: u64) -> HopConsensus {
        let mut consensus = HopConsensus::new(ConsensusParams::default(), 4, 16).unwrap();
        for n in 1..=count {
            let ctx = CallContext::new(validator(n), 1);
            consensus.register_validator(&ctx, n.to_be_bytes().to_vec().hash()).unwrap();
            consensus.authorize_validator(&validator(n), 100).unwrap();
        }
        consensus
    }

    fn request(required: usize) -> ProofRequest {
        request_for(b"tx-1", required)
    }

    fn request_for(tx: &[u8], required: usize) -> ProofRequest {
        ProofRequest {
            tx_hash: tx.hash(),
            required_validators: required,
            fee: Amount::from_u64(1000),
            cross_network: false,
        }
    }

    fn attest(consensus: &mut HopConsensus, proof_id: &Hash, hop: usize, now: Timestamp) -> ConsensusResult<HopOutcome> {
        let owner = consensus.get_proof(proof_id).unwrap().path[hop];
        let ctx = CallContext::new(owner, now);
        consensus.submit_hop(&ctx, proof_id, hop, format!("hop-{}", hop).as_str().hash())
    }

    #[test]
    fn test_reached_at_four_of_five() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();
        assert_eq!(consensus.get_proof(&proof_id).unwrap().status, ConsensusStatus::Pending);

        for hop in 0..3 {
            let outcome = attest(&mut consensus, &proof_id, hop, 110).unwrap();
            assert!(matches!(outcome, HopOutcome::Validating { .. }));
        }
        assert_eq!(consensus.get_proof(&proof_id).unwrap().score, 600);

        let outcome = attest(&mut consensus, &proof_id, 3, 130).unwrap();
        let receipt = match outcome {
            HopOutcome::Reached(receipt) => receipt,
            other => panic!("expected consensus, got {:?}", other),
        };
        assert_eq!(receipt.score, 800);
        assert_eq!(receipt.validation_time, 20);
        assert_eq!(receipt.responders.len(), 4);

        let proof = consensus.get_proof(&proof_id).unwrap();
        assert_eq!(proof.status, ConsensusStatus::ConsensusReached);

        // Late fifth hop after the deadline hits a finalized proof
        assert_eq!(
            attest(&mut consensus, &proof_id, 4, 10_000).unwrap_err(),
            ConsensusError::ProofFinalized(proof_id)
        );
        assert_eq!(consensus.get_proof(&proof_id).unwrap().status, ConsensusStatus::ConsensusReached);
        assert_eq!(consensus.receipt(&proof_id).unwrap(), receipt);
    }

    #[test]
    fn test_receipt_requires_reached_proof() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();
        assert_eq!(
            consensus.receipt(&proof_id).unwrap_err(),
            ConsensusError::NotReached(proof_id)
        );
        assert!(matches!(
            consensus.receipt(&Hash::zero()),
            Err(ConsensusError::ProofNotFound(_))
        ));
    }

    #[test]
    fn test_hop_slot_written_once() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();

        attest(&mut consensus, &proof_id, 0, 101).unwrap();
        assert_eq!(
            attest(&mut consensus, &proof_id, 0, 102).unwrap_err(),
            ConsensusError::HopAlreadySubmitted(0)
        );
        assert_eq!(consensus.get_proof(&proof_id).unwrap().completed_hops(), 1);
    }

    #[test]
    fn test_only_path_owner_may_submit() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();

        let intruder = CallContext::new(validator(42), 101);
        assert!(matches!(
            consensus.submit_hop(&intruder, &proof_id, 0, b"x".hash()),
            Err(ConsensusError::NotHopOwner { .. })
        ));

        let owner = consensus.get_proof(&proof_id).unwrap().path[0];
        let ctx = CallContext::new(owner, 101);
        assert!(matches!(
            consensus.submit_hop(&ctx, &proof_id, 9, b"x".hash()),
            Err(ConsensusError::HopIndexOutOfRange { index: 9, len: 5 })
        ));
        assert_eq!(
            consensus.submit_hop(&ctx, &proof_id, 0, Hash::zero()).unwrap_err(),
            ConsensusError::EmptyHopProof
        );
    }

    #[test]
    fn test_expires_lazily_without_recording() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();

        for hop in 0..3 {
            attest(&mut consensus, &proof_id, hop, 110).unwrap();
        }
        // 110 + 300 is still inside the window
        assert_eq!(consensus.get_proof(&proof_id).unwrap().status, ConsensusStatus::Validating);

        let outcome = attest(&mut consensus, &proof_id, 3, 411).unwrap();
        assert_eq!(outcome, HopOutcome::Expired);

        let proof = consensus.get_proof(&proof_id).unwrap();
        assert_eq!(proof.status, ConsensusStatus::Expired);
        assert_eq!(proof.completed_hops(), 3);
    }

    #[test]
    fn test_sweep_closes_abandoned_proofs() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let stale = consensus.initiate(&ctx, request(5)).unwrap();
        let fresh = consensus.initiate(&ctx.at(350), request_for(b"tx-2", 5)).unwrap();

        let expired = consensus.sweep_expired(401);
        assert_eq!(expired, vec![stale]);
        assert_eq!(consensus.get_proof(&stale).unwrap().status, ConsensusStatus::Expired);
        assert_eq!(consensus.get_proof(&fresh).unwrap().status, ConsensusStatus::Pending);
    }

    #[test]
    fn test_validator_counters_after_consensus() {
        let mut consensus = setup(3);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(3)).unwrap();

        for hop in 0..3 {
            attest(&mut consensus, &proof_id, hop, 102).unwrap();
        }
        let proof = consensus.get_proof(&proof_id).unwrap().clone();
        assert_eq!(proof.status, ConsensusStatus::ConsensusReached);

        for (_, v) in proof.responders() {
            let node = consensus.registry().get(&v).unwrap();
            assert_eq!(node.success_count, 1);
            assert_eq!(node.avg_latency_ms, 2000);
        }
        assert!(consensus.avg_consensus_time() <= 1);
    }

    #[test]
    fn test_required_below_minimum_rejected() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        assert_eq!(
            consensus.initiate(&ctx, request(2)).unwrap_err(),
            ConsensusError::InvalidParams("path length 2 below minimum 3".into())
        );
    }

    #[test]
    fn test_too_few_active_validators() {
        let mut consensus = setup(2);
        let ctx = CallContext::new(validator(99), 100);
        assert!(matches!(
            consensus.initiate(&ctx, request(3)),
            Err(ConsensusError::InsufficientValidators { required: 3, available: 2 })
        ));
    }

    #[test]
    fn test_emergency_clamps_and_halt_blocks() {
        let mut consensus = setup(6);
        let ctx = CallContext::new(validator(99), 100);

        consensus.set_emergency_level(EmergencyLevel::Emergency);
        let proof_id = consensus.initiate(&ctx, request(6)).unwrap();
        assert_eq!(consensus.get_proof(&proof_id).unwrap().path_len(), 3);

        consensus.set_emergency_level(EmergencyLevel::Halt);
        assert_eq!(
            consensus.initiate(&ctx, request(6)).unwrap_err(),
            ConsensusError::EmergencyHalt
        );
    }

    #[test]
    fn test_events_emitted() {
        let mut consensus = setup(3);
        consensus.drain_events();

        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(3)).unwrap();
        for hop in 0..3 {
            let _ = attest(&mut consensus, &proof_id, hop, 101);
        }

        let events = consensus.drain_events();
        assert!(matches!(events.first(), Some(EngineEvent::ProofStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::ConsensusReached { .. })));
    }

    #[test]
    fn test_transaction_gets_one_live_proof() {
        let mut consensus = setup(3);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(3)).unwrap();

        assert_eq!(
            consensus.initiate(&ctx.at(101), request(3)).unwrap_err(),
            ConsensusError::DuplicateTransaction(b"tx-1".hash())
        );

        for hop in 0..3 {
            attest(&mut consensus, &proof_id, hop, 102).unwrap();
        }
        assert_eq!(
            consensus.initiate(&ctx.at(103), request(3)).unwrap_err(),
            ConsensusError::DuplicateTransaction(b"tx-1".hash())
        );
        assert_eq!(consensus.proof_count(), 1);
    }

    #[test]
    fn test_expired_transaction_may_retry() {
        let mut consensus = setup(3);
        let ctx = CallContext::new(validator(99), 100);
        let first = consensus.initiate(&ctx, request(3)).unwrap();
        assert_eq!(consensus.sweep_expired(401), vec![first]);

        let retry = consensus.initiate(&ctx.at(402), request(3)).unwrap();
        assert_ne!(retry, first);
        assert!(consensus.ensure_transaction_open(&b"tx-1".hash()).is_err());
    }

    #[test]
    fn test_blacklisting_path_members_fails_the_proof() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();
        let path = consensus.get_proof(&proof_id).unwrap().path.clone();
        attest(&mut consensus, &proof_id, 0, 101).unwrap();
        consensus.drain_events();

        // Four of five hops can still arrive: 800 is in reach
        assert!(consensus.blacklist_validator(&path[1], 102).unwrap().is_empty());
        assert_eq!(consensus.get_proof(&proof_id).unwrap().status, ConsensusStatus::Validating);

        // Three left: at most 600 against 670
        assert_eq!(consensus.blacklist_validator(&path[2], 103).unwrap(), vec![proof_id]);
        let proof = consensus.get_proof(&proof_id).unwrap();
        assert_eq!(proof.status, ConsensusStatus::ConsensusFailed);
        assert_eq!(proof.score, 200);

        for v in &path {
            let node = consensus.registry().get(v).unwrap();
            assert_eq!(node.fail_count, 1);
            assert_eq!(node.success_count, 0);
            assert_eq!(node.success_rate, 0);
            assert_eq!(node.reputation, 480);
        }
        assert!(consensus.drain_events().iter().any(|e| matches!(
            e,
            EngineEvent::ConsensusFailed { proof_id: id, score: 200 } if *id == proof_id
        )));

        assert_eq!(
            attest(&mut consensus, &proof_id, 3, 104).unwrap_err(),
            ConsensusError::ProofFinalized(proof_id)
        );
        assert_eq!(consensus.status_counts().get(&ConsensusStatus::ConsensusFailed), Some(&1));
    }

    #[test]
    fn test_blacklisted_validator_cannot_attest() {
        let mut consensus = setup(5);
        let ctx = CallContext::new(validator(99), 100);
        let proof_id = consensus.initiate(&ctx, request(5)).unwrap();
        let owner = consensus.get_proof(&proof_id).unwrap().path[0];

        consensus.blacklist_validator(&owner, 101).unwrap();
        let ctx = CallContext::new(owner, 102);
        assert_eq!(
            consensus.submit_hop(&ctx, &proof_id, 0, b"late".hash()).unwrap_err(),
            ConsensusError::ValidatorBlacklisted(owner)
        );
        assert_eq!(consensus.get_proof(&proof_id).unwrap().status, ConsensusStatus::Pending);
    }

    #[test]
    fn test_registration_spreads_across_shards() {
        let consensus = setup(8);
        for shard in consensus.shards().shards() {
            assert_eq!(shard.members.len(), 2);
            assert_eq!(shard.active_count, 2);
        }
    }
}
