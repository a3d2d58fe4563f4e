// mesh-core/src/events.rs

//! Observability events.
//!
//! Fire-and-forget records for external logging and indexing. Components push
//! into an [`EventOutbox`]; the engine drains them after each operation.

use crate::{Amount, EmergencyLevel, NetworkId, ThrottleMode, Timestamp};
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ValidatorRegistered {
        validator: Address,
        shard: u16,
    },
    ValidatorAuthorized {
        validator: Address,
        power: u16,
    },
    ValidatorDeauthorized {
        validator: Address,
    },
    ProofStarted {
        proof_id: Hash,
        tx_hash: Hash,
        path: Vec<Address>,
    },
    HopValidated {
        proof_id: Hash,
        hop_index: usize,
        validator: Address,
        score: u64,
    },
    ConsensusReached {
        proof_id: Hash,
        score: u64,
        validation_time: u64,
    },
    ConsensusFailed {
        proof_id: Hash,
        score: u64,
    },
    ProofExpired {
        proof_id: Hash,
    },
    RouteRequested {
        request_id: Hash,
        sender: Address,
        target: NetworkId,
        amount: Amount,
    },
    RouteCalculated {
        request_id: Hash,
        hops: Vec<NetworkId>,
        quality_score: u64,
    },
    RouteExecuted {
        request_id: Hash,
        success: bool,
        latency_ms: u64,
    },
    RouteRerouted {
        request_id: Hash,
        from: NetworkId,
        to: NetworkId,
    },
    RateLimitTriggered {
        network: NetworkId,
        backoff_until: Timestamp,
    },
    ThrottleModeChanged {
        from: ThrottleMode,
        to: ThrottleMode,
    },
    RewardDistributed {
        tx_id: Hash,
        host: Address,
        amount: Amount,
    },
    RewardRejected {
        tx_id: Hash,
        host: Address,
        amount: Amount,
    },
    RewardClaimed {
        host: Address,
        amount: Amount,
    },
    EmergencyActivated {
        level: EmergencyLevel,
    },
    EmergencyCleared,
}

/// Buffer of events not yet handed to the outside
#[derive(Debug, Clone, Default)]
pub struct EventOutbox {
    events: Vec<EngineEvent>,
}

impl EventOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: EngineEvent) {
        tracing::debug!(?event, "engine event");
        self.events.push(event);
    }

    /// Take every buffered event, oldest first
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_outbox() {
        let mut outbox = EventOutbox::new();
        outbox.emit(EngineEvent::EmergencyCleared);
        outbox.emit(EngineEvent::ProofExpired { proof_id: Hash::zero() });
        assert_eq!(outbox.len(), 2);

        let events = outbox.drain();
        assert_eq!(events[0], EngineEvent::EmergencyCleared);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = EngineEvent::ThrottleModeChanged {
            from: ThrottleMode::Normal,
            to: ThrottleMode::Emergency,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "throttle_mode_changed");
    }
}
