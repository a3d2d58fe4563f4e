// mesh-core/src/context.rs

use crate::Timestamp;
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};

/// Ambient context of one externally invoked operation
///
/// Carries the caller identity, the current time and a public entropy value
/// (for example the latest block hash of the host chain).
///
/// The seeds derived here are predictable by anyone who knows these three
/// values, and the caller controls two of them. They are adequate for load
/// spreading, not for adversarial selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
    pub entropy: Hash,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self {
            caller,
            now,
            entropy: Hash::zero(),
        }
    }

    pub fn with_entropy(mut self, entropy: Hash) -> Self {
        self.entropy = entropy;
        self
    }

    /// Same caller and entropy at a different time
    pub fn at(&self, now: Timestamp) -> Self {
        Self { now, ..*self }
    }

    /// Same time and entropy for a different caller
    pub fn as_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }

    /// Derive a unique identifier from caller, time, entropy, a domain tag and a nonce
    pub fn derive_id(&self, tag: &[u8], nonce: u64) -> Hash {
        Hash::of_parts(&[
            tag,
            self.caller.as_bytes(),
            &self.now.to_be_bytes(),
            self.entropy.as_bytes(),
            &nonce.to_be_bytes(),
        ])
    }

    /// Weak pseudo-random seed for selection walks
    pub fn seed(&self, tag: &[u8]) -> u64 {
        self.derive_id(tag, 0).to_u64()
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}
