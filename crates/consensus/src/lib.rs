// consensus/src/lib.rs

//! Hop-based, stake-neutral consensus
//!
//! This crate implements validation by routing a transaction through an
//! ordered path of independently selected validators ("hops"):
//! - Validators register with a device fingerprint and are authorized by the admin
//! - Each validator is placed in the least-loaded shard
//! - A path is drawn with a seeded index walk over the active set
//! - Consensus is reached once enough hops attest within the deadline

pub mod hop;
pub mod proof;
pub mod selection;
pub mod shard;
pub mod validator;

pub use hop::{ConsensusReceipt, HopConsensus, HopOutcome, ProofRequest};
pub use proof::{ConsensusParams, ConsensusProof, ConsensusStatus, Evaluation};
pub use selection::{PathSelector, SelectedPath};
pub use shard::{ShardAllocator, ValidationShard};
pub use validator::{ValidatorNode, ValidatorRegistry};

use mesh_core::CoreError;
use mesh_crypto::{Address, Hash};

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors that can occur during consensus operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Validator already exists: {0}")]
    ValidatorAlreadyExists(Address),

    #[error("Device fingerprint already bound to a validator: {0}")]
    DuplicateFingerprint(Hash),

    #[error("Validator not found: {0}")]
    ValidatorNotFound(Address),

    #[error("Validator already authorized: {0}")]
    ValidatorAlreadyAuthorized(Address),

    #[error("Validator is blacklisted: {0}")]
    ValidatorBlacklisted(Address),

    #[error("Invalid validation power: {0}")]
    InvalidPower(String),

    #[error("Insufficient validators: required {required}, available {available}")]
    InsufficientValidators { required: usize, available: usize },

    #[error("Transaction {0} already has a live or settled proof")]
    DuplicateTransaction(Hash),

    #[error("Consensus proof not found: {0}")]
    ProofNotFound(Hash),

    #[error("Caller {caller} does not own hop {hop_index}")]
    NotHopOwner { caller: Address, hop_index: usize },

    #[error("Hop {0} already holds a proof")]
    HopAlreadySubmitted(usize),

    #[error("Hop index {index} out of range for path of {len}")]
    HopIndexOutOfRange { index: usize, len: usize },

    #[error("Empty hop proof")]
    EmptyHopProof,

    #[error("Consensus proof {0} is already finalized")]
    ProofFinalized(Hash),

    #[error("Consensus proof {0} has not reached consensus")]
    NotReached(Hash),

    #[error("Invalid consensus parameters: {0}")]
    InvalidParams(String),

    #[error("Every shard is at capacity ({0})")]
    ShardsFull(usize),

    #[error("Consensus halted by emergency mode")]
    EmergencyHalt,

    #[error(transparent)]
    Core(#[from] CoreError),
}
