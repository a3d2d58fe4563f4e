// consensus/src/proof.rs

use crate::{ConsensusError, ConsensusResult};
use mesh_core::fixed::SCALE;
use mesh_core::{Amount, PerMille, Timestamp};
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};

/// Upper bound on path length
pub const MAX_PATH_LENGTH: usize = 64;

/// Lifecycle of a consensus proof.
///
/// `ConsensusReached`, `ConsensusFailed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusStatus {
    Pending,
    Validating,
    ConsensusReached,
    ConsensusFailed,
    Expired,
}

impl ConsensusStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsensusStatus::ConsensusReached | ConsensusStatus::ConsensusFailed | ConsensusStatus::Expired
        )
    }
}

/// Consensus parameters (admin-settable, replaced as a whole)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Minimum path length
    pub min_validators: usize,
    /// Path length suggested to callers
    pub optimal_validators: usize,
    /// Score needed for consensus (0-1000]
    pub consensus_threshold: PerMille,
    /// Deadline measured from the first recorded hop
    pub max_validation_time_secs: u64,
    /// Ceiling on the latency sample a single hop contributes
    pub hop_timeout_ms: u64,
    /// Clamp every path to `min_validators`
    pub emergency_mode: bool,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            min_validators: 3,
            optimal_validators: 5,
            consensus_threshold: 670,
            max_validation_time_secs: 300,
            hop_timeout_ms: 30_000,
            emergency_mode: false,
        }
    }
}

impl ConsensusParams {
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.min_validators == 0 {
            return Err(ConsensusError::InvalidParams("min_validators must be positive".into()));
        }
        if self.optimal_validators < self.min_validators {
            return Err(ConsensusError::InvalidParams(
                "optimal_validators below min_validators".into(),
            ));
        }
        if self.optimal_validators > MAX_PATH_LENGTH {
            return Err(ConsensusError::InvalidParams(format!(
                "optimal_validators above {}",
                MAX_PATH_LENGTH
            )));
        }
        if self.consensus_threshold == 0 || self.consensus_threshold > SCALE {
            return Err(ConsensusError::InvalidParams(
                "consensus_threshold must be in (0, 1000]".into(),
            ));
        }
        if self.max_validation_time_secs == 0 {
            return Err(ConsensusError::InvalidParams(
                "max_validation_time_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Path length actually used for a request of `required` hops
    pub fn effective_path_length(&self, required: usize) -> usize {
        if self.emergency_mode {
            self.min_validators
        } else {
            required
        }
    }
}

/// Result of scoring a proof's recorded hops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Reached { score: PerMille },
    Failed { score: PerMille },
    Validating { score: PerMille },
}

impl Evaluation {
    /// Score = completed * 1000 / path length, floor division.
    pub fn of(completed: usize, path_len: usize, threshold: PerMille) -> Self {
        Self::with_void(completed, 0, path_len, threshold)
    }

    /// Like [`Evaluation::of`], with `void` empty hops that can no longer arrive.
    ///
    /// Reached as soon as the score meets the threshold. Failed once even
    /// every remaining hop could not lift the score to the threshold.
    pub fn with_void(completed: usize, void: usize, path_len: usize, threshold: PerMille) -> Self {
        let len = path_len.max(1) as u64;
        let score = (completed as u64).saturating_mul(SCALE) / len;
        let best = (path_len.saturating_sub(void) as u64).saturating_mul(SCALE) / len;
        if score >= threshold {
            Evaluation::Reached { score }
        } else if completed >= path_len || best < threshold {
            Evaluation::Failed { score }
        } else {
            Evaluation::Validating { score }
        }
    }

    pub fn score(&self) -> PerMille {
        match self {
            Evaluation::Reached { score }
            | Evaluation::Failed { score }
            | Evaluation::Validating { score } => *score,
        }
    }
}

/// One transaction's journey through its validator path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusProof {
    pub id: Hash,
    pub tx_hash: Hash,
    pub initiator: Address,
    pub path: Vec<Address>,
    /// Attestation per hop, zero while empty
    pub hop_proofs: Vec<Hash>,
    /// Submission time per hop, zero while empty
    pub timestamps: Vec<Timestamp>,
    pub score: PerMille,
    pub status: ConsensusStatus,
    pub created_at: Timestamp,
    /// Seconds from the first hop to consensus
    pub validation_time: Option<u64>,
    /// Fee paid at initiation, basis of the host rewards
    pub fee: Amount,
    pub cross_network: bool,
    /// The path contains duplicate validators
    pub degraded: bool,
}

impl ConsensusProof {
    pub fn new(
        id: Hash,
        tx_hash: Hash,
        initiator: Address,
        path: Vec<Address>,
        fee: Amount,
        cross_network: bool,
        created_at: Timestamp,
    ) -> Self {
        let len = path.len();
        Self {
            id,
            tx_hash,
            initiator,
            path,
            hop_proofs: vec![Hash::zero(); len],
            timestamps: vec![0; len],
            score: 0,
            status: ConsensusStatus::Pending,
            created_at,
            validation_time: None,
            fee,
            cross_network,
            degraded: false,
        }
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn completed_hops(&self) -> usize {
        self.hop_proofs.iter().filter(|p| !p.is_zero()).count()
    }

    /// Earliest recorded hop time
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.hop_proofs.iter()
            .zip(&self.timestamps)
            .filter(|(p, _)| !p.is_zero())
            .map(|(_, t)| *t)
            .min()
    }

    /// Start of the validation window; creation time until a hop is recorded
    pub fn started_at(&self) -> Timestamp {
        self.first_timestamp().unwrap_or(self.created_at)
    }

    pub fn is_past_deadline(&self, now: Timestamp, max_validation_time_secs: u64) -> bool {
        now.saturating_sub(self.started_at()) > max_validation_time_secs
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validators whose hop holds an attestation, with their hop index
    pub fn responders(&self) -> Vec<(usize, Address)> {
        self.path.iter()
            .zip(&self.hop_proofs)
            .enumerate()
            .filter(|(_, (_, p))| !p.is_zero())
            .map(|(i, (v, _))| (i, *v))
            .collect()
    }
}
