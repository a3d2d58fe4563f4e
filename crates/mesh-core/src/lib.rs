// mesh-core/src/lib.rs

//! Shared building blocks for the hop-mesh engine
//!
//! This crate provides:
//! - Amount, timestamp and fixed-point arithmetic (scale 1000)
//! - Call context (caller identity, time, weak entropy)
//! - The token ledger collaborator interface
//! - Per-network health tracking and the global throttle mode
//! - Observability events and the re-entrancy guard

pub mod context;
pub mod events;
pub mod fixed;
pub mod guard;
pub mod health;
pub mod ledger;
pub mod types;

pub use context::{CallContext, Clock, SystemClock};
pub use events::{EngineEvent, EventOutbox};
pub use fixed::SCALE;
pub use guard::{GuardScope, ReentrancyGuard};
pub use health::{NetworkHealth, NetworkHealthStore, ThrottleMode};
pub use ledger::{InMemoryLedger, TokenLedger};
pub use types::*;

use mesh_crypto::Address;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors shared by every engine component
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Re-entrant call into {0} rejected")]
    Reentrant(&'static str),

    #[error("Caller {0} is not authorized for this operation")]
    Unauthorized(Address),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),
}
