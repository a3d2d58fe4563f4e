// node/src/lib.rs
pub mod config;
pub mod engine;
pub mod runtime;
pub mod simulation;

pub use config::{EngineConfig, NodeConfig};
pub use engine::{EngineStatus, HopMeshEngine, SweepReport};
pub use runtime::Node;
pub use simulation::SimulationReport;

use consensus::ConsensusError;
use economics::EconomicsError;
use mesh_core::CoreError;
use routing::RoutingError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine facade
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Economics(#[from] EconomicsError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}
