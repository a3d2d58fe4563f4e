// consensus/src/selection.rs

use crate::{ConsensusError, ConsensusResult};
use mesh_crypto::Address;
use serde::{Deserialize, Serialize};

/// Default stride between successive path slots
pub const DEFAULT_STRIDE: u64 = 997;

/// Outcome of a path draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPath {
    pub validators: Vec<Address>,
    /// At least one slot fell back to a validator already on the path
    pub degraded: bool,
}

/// Seeded index walk over the active validator set.
///
/// Slot `i` starts at `(seed + i * stride) mod n` and probes forward one index
/// per collision. After `2 * n` probes the slot accepts the duplicate.
///
/// The seed comes from caller-visible data (caller, time, weak entropy), so a
/// motivated caller can steer the path. Swap the seed source, not this walk,
/// when a verifiable randomness source is available.
#[derive(Debug, Clone, Copy)]
pub struct PathSelector {
    stride: u64,
}

impl Default for PathSelector {
    fn default() -> Self {
        Self::new(DEFAULT_STRIDE)
    }
}

impl PathSelector {
    pub fn new(stride: u64) -> Self {
        Self { stride: stride.max(1) }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Draw `required` validators from `active`, in registration order
    pub fn select_path(
        &self,
        active: &[Address],
        required: usize,
        seed: u64,
    ) -> ConsensusResult<SelectedPath> {
        let count = active.len() as u64;
        if count == 0 || required == 0 {
            return Err(ConsensusError::InsufficientValidators {
                required,
                available: active.len(),
            });
        }

        let max_attempts = count.saturating_mul(2);
        let mut chosen = Vec::with_capacity(required);
        let mut taken = vec![false; active.len()];
        let mut degraded = false;

        for slot in 0..required as u64 {
            let base = seed.wrapping_add(slot.wrapping_mul(self.stride));
            let mut attempts = 0u64;
            let index = loop {
                let candidate = (base.wrapping_add(attempts) % count) as usize;
                if !taken[candidate] {
                    break candidate;
                }
                attempts += 1;
                if attempts >= max_attempts {
                    degraded = true;
                    break candidate;
                }
            };

            taken[index] = true;
            chosen.push(active[index]);
        }

        if degraded {
            tracing::warn!(
                "Path of {} drawn from {} validators contains duplicates",
                required,
                count
            );
        }

        Ok(SelectedPath { validators: chosen, degraded })
    }
}
