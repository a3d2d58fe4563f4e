// consensus/src/shard.rs

use crate::validator::ValidatorRegistry;
use crate::{ConsensusError, ConsensusResult};
use mesh_core::fixed::ema;
use mesh_core::ShardId;
use mesh_crypto::Address;
use serde::{Deserialize, Serialize};

/// A fixed-capacity group of validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationShard {
    pub id: ShardId,
    pub members: Vec<Address>,
    /// Members currently authorized and not blacklisted
    pub active_count: usize,
    pub capacity: usize,
    /// Consensus time EMA in seconds
    pub avg_consensus_time: u64,
    /// Proofs completed by paths starting in this shard
    pub completed_proofs: u64,
}

impl ValidationShard {
    pub fn new(id: ShardId, capacity: usize) -> Self {
        Self {
            id,
            members: Vec::new(),
            active_count: 0,
            capacity,
            avg_consensus_time: 0,
            completed_proofs: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }
}

/// Least-loaded shard placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardAllocator {
    shards: Vec<ValidationShard>,
}

impl ShardAllocator {
    pub fn new(shard_count: u16, capacity: usize) -> Self {
        Self {
            shards: (0..shard_count)
                .map(|id| ValidationShard::new(id, capacity))
                .collect(),
        }
    }

    /// Place a validator in the shard with the fewest members.
    ///
    /// Ties go to the lowest shard id.
    pub fn assign_to_optimal_shard(&mut self, validator: Address) -> ConsensusResult<ShardId> {
        let shard = self.shards.iter_mut()
            .min_by_key(|s| (s.members.len(), s.id))
            .ok_or(ConsensusError::ShardsFull(0))?;

        if shard.is_full() {
            return Err(ConsensusError::ShardsFull(shard.capacity));
        }

        shard.members.push(validator);
        tracing::debug!("Assigned validator {} to shard {}", validator, shard.id);
        Ok(shard.id)
    }

    /// Recount active members against the registry
    pub fn refresh_active_counts(&mut self, registry: &ValidatorRegistry) {
        for shard in &mut self.shards {
            shard.active_count = shard.members.iter()
                .filter(|m| registry.is_active(m))
                .count();
        }
    }

    /// Fold a completed proof's validation time into its shard's average
    pub fn record_consensus_time(&mut self, shard: ShardId, validation_time: u64) {
        if let Some(shard) = self.shards.get_mut(shard as usize) {
            shard.avg_consensus_time = if shard.completed_proofs == 0 {
                validation_time
            } else {
                ema(shard.avg_consensus_time, validation_time)
            };
            shard.completed_proofs = shard.completed_proofs.saturating_add(1);
        }
    }

    pub fn shard(&self, id: ShardId) -> Option<&ValidationShard> {
        self.shards.get(id as usize)
    }

    pub fn shards(&self) -> &[ValidationShard] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::Hash;

    #[test]
    fn test_balanced_assignment() {
        let mut allocator = ShardAllocator::new(3, 10);
        let shards: Vec<_> = (0..6)
            .map(|n| allocator.assign_to_optimal_shard(Address::from_low_u64(n)).unwrap())
            .collect();
        assert_eq!(shards, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_full_shards_rejected() {
        let mut allocator = ShardAllocator::new(2, 1);
        allocator.assign_to_optimal_shard(Address::from_low_u64(1)).unwrap();
        allocator.assign_to_optimal_shard(Address::from_low_u64(2)).unwrap();
        assert_eq!(
            allocator.assign_to_optimal_shard(Address::from_low_u64(3)).unwrap_err(),
            ConsensusError::ShardsFull(1)
        );
    }

    #[test]
    fn test_no_shards_rejected() {
        let mut allocator = ShardAllocator::new(0, 10);
        assert!(allocator.assign_to_optimal_shard(Address::from_low_u64(1)).is_err());
    }

    #[test]
    fn test_active_count_refresh() {
        let mut registry = ValidatorRegistry::new();
        let mut allocator = ShardAllocator::new(1, 10);
        for n in 0..3u64 {
            let address = Address::from_low_u64(n);
            registry.register(address, Hash::new([n as u8 + 1; 32]), 0).unwrap();
            allocator.assign_to_optimal_shard(address).unwrap();
        }
        registry.authorize(&Address::from_low_u64(0), 10).unwrap();
        registry.authorize(&Address::from_low_u64(2), 10).unwrap();

        allocator.refresh_active_counts(&registry);
        assert_eq!(allocator.shard(0).unwrap().active_count, 2);
    }

    #[test]
    fn test_consensus_time_ema() {
        let mut allocator = ShardAllocator::new(1, 10);
        allocator.record_consensus_time(0, 20);
        allocator.record_consensus_time(0, 120);
        let shard = allocator.shard(0).unwrap();
        assert_eq!(shard.avg_consensus_time, 30);
        assert_eq!(shard.completed_proofs, 2);
    }
}
