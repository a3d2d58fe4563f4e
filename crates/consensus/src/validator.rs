// consensus/src/validator.rs

use crate::{ConsensusError, ConsensusResult};
use mesh_core::fixed::{ema, SCALE};
use mesh_core::{PerMille, ShardId, Timestamp};
use mesh_crypto::{Address, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound of the validation power set at authorization
pub const MAX_VALIDATION_POWER: u16 = 1000;

/// Reputation gained per hop that ends in consensus
pub const REPUTATION_GAIN: PerMille = 5;

/// Reputation lost per failed path membership
pub const REPUTATION_PENALTY: PerMille = 20;

/// Starting reputation of a newly registered validator
pub const INITIAL_REPUTATION: PerMille = 500;

/// Complete validator information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorNode {
    /// Validator identity
    pub address: Address,
    /// Device fingerprint bound at registration
    pub device_fingerprint: Hash,
    /// Validation power (0 until first authorization, then fixed)
    pub validation_power: u16,
    /// Hops attested in proofs that reached consensus
    pub success_count: u64,
    /// Path memberships in proofs that failed
    pub fail_count: u64,
    /// Latency EMA of attested hops in milliseconds
    pub avg_latency_ms: u64,
    /// success / (success + fail), 1000 with no history
    pub success_rate: PerMille,
    /// Reputation (0-1000)
    pub reputation: PerMille,
    /// Admin approval
    pub is_authorized: bool,
    /// Permanently excluded from selection
    pub is_blacklisted: bool,
    /// Assigned shard
    pub shard: Option<ShardId>,
    /// Registration timestamp
    pub registered_at: Timestamp,
    /// Last active timestamp
    pub last_active: Timestamp,
}

impl ValidatorNode {
    pub fn new(address: Address, device_fingerprint: Hash, now: Timestamp) -> Self {
        Self {
            address,
            device_fingerprint,
            validation_power: 0,
            success_count: 0,
            fail_count: 0,
            avg_latency_ms: 0,
            success_rate: SCALE,
            reputation: INITIAL_REPUTATION,
            is_authorized: false,
            is_blacklisted: false,
            shard: None,
            registered_at: now,
            last_active: now,
        }
    }

    /// Eligible for path selection
    pub fn is_active(&self) -> bool {
        self.is_authorized && !self.is_blacklisted
    }

    fn refresh_success_rate(&mut self) {
        let total = self.success_count.saturating_add(self.fail_count);
        self.success_rate = if total == 0 {
            SCALE
        } else {
            self.success_count.saturating_mul(SCALE) / total
        };
    }

    /// Credit one attested hop of a proof that reached consensus
    pub fn record_success(&mut self, latency_ms: u64, now: Timestamp) {
        self.avg_latency_ms = if self.success_count == 0 {
            latency_ms
        } else {
            ema(self.avg_latency_ms, latency_ms)
        };
        self.success_count = self.success_count.saturating_add(1);
        self.reputation = self.reputation.saturating_add(REPUTATION_GAIN).min(SCALE);
        self.refresh_success_rate();
        self.last_active = now;
    }

    /// Charge one membership in a failed path
    pub fn record_failure(&mut self, now: Timestamp) {
        self.fail_count = self.fail_count.saturating_add(1);
        self.reputation = self.reputation.saturating_sub(REPUTATION_PENALTY);
        self.refresh_success_rate();
        self.last_active = now;
    }
}

/// Manages the validator set.
///
/// Registration order is kept explicitly; path selection indexes into the
/// active validators in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    validators: HashMap<Address, ValidatorNode>,
    order: Vec<Address>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&ValidatorNode> {
        self.validators.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut ValidatorNode> {
        self.validators.get_mut(address)
    }

    fn require_mut(&mut self, address: &Address) -> ConsensusResult<&mut ValidatorNode> {
        self.validators.get_mut(address)
            .ok_or(ConsensusError::ValidatorNotFound(*address))
    }

    /// Register a new, not yet authorized validator
    pub fn register(
        &mut self,
        address: Address,
        device_fingerprint: Hash,
        now: Timestamp,
    ) -> ConsensusResult<&ValidatorNode> {
        if self.validators.contains_key(&address) {
            return Err(ConsensusError::ValidatorAlreadyExists(address));
        }

        // Pending and deauthorized validators keep their device; blacklisting releases it
        let fingerprint_taken = self.validators.values()
            .any(|v| !v.is_blacklisted && v.device_fingerprint == device_fingerprint);
        if fingerprint_taken {
            return Err(ConsensusError::DuplicateFingerprint(device_fingerprint));
        }

        self.order.push(address);
        let node = self.validators.entry(address)
            .or_insert_with(|| ValidatorNode::new(address, device_fingerprint, now));

        tracing::info!("Registered validator {}", address);
        Ok(node)
    }

    /// Approve a validator. Power is fixed by the first authorization.
    pub fn authorize(&mut self, address: &Address, power: u16) -> ConsensusResult<()> {
        if power == 0 || power > MAX_VALIDATION_POWER {
            return Err(ConsensusError::InvalidPower(format!(
                "{} not in 1..={}",
                power, MAX_VALIDATION_POWER
            )));
        }

        let validator = self.require_mut(address)?;
        if validator.is_authorized {
            return Err(ConsensusError::ValidatorAlreadyAuthorized(*address));
        }
        if validator.validation_power != 0 && validator.validation_power != power {
            return Err(ConsensusError::InvalidPower(format!(
                "power is fixed at {}",
                validator.validation_power
            )));
        }

        validator.validation_power = power;
        validator.is_authorized = true;
        tracing::info!("Authorized validator {} with power {}", address, power);
        Ok(())
    }

    /// Withdraw approval; the validator keeps its record and shard seat
    pub fn deauthorize(&mut self, address: &Address) -> ConsensusResult<()> {
        let validator = self.require_mut(address)?;
        validator.is_authorized = false;
        tracing::info!("Deauthorized validator {}", address);
        Ok(())
    }

    /// Exclude a validator from selection for good
    pub fn blacklist(&mut self, address: &Address) -> ConsensusResult<()> {
        let validator = self.require_mut(address)?;
        validator.is_blacklisted = true;
        tracing::warn!("Blacklisted validator {}", address);
        Ok(())
    }

    pub fn record_success(&mut self, address: &Address, latency_ms: u64, now: Timestamp) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.record_success(latency_ms, now);
        }
    }

    pub fn record_failure(&mut self, address: &Address, now: Timestamp) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.record_failure(now);
        }
    }

    /// Active validators in registration order
    pub fn active_validators(&self) -> Vec<Address> {
        self.order.iter()
            .filter(|a| self.validators.get(a).is_some_and(|v| v.is_active()))
            .copied()
            .collect()
    }

    pub fn is_active(&self, address: &Address) -> bool {
        self.validators.get(address).is_some_and(|v| v.is_active())
    }

    /// Every validator in registration order
    pub fn all_validators(&self) -> Vec<&ValidatorNode> {
        self.order.iter()
            .filter_map(|a| self.validators.get(a))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.validators.len()
    }

    pub fn active_count(&self) -> usize {
        self.validators.values().filter(|v| v.is_active()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::Hashable;

    fn fingerprint(n: u64) -> Hash {
        n.to_be_bytes().to_vec().hash()
    }

    #[test]
    fn test_register_and_authorize() {
        let mut registry = ValidatorRegistry::new();
        let address = Address::from_low_u64(1);

        let node = registry.register(address, fingerprint(1), 10).unwrap();
        assert_eq!(node.success_rate, 1000);
        assert_eq!(node.reputation, 500);
        assert!(!node.is_active());
        assert_eq!(registry.active_count(), 0);

        registry.authorize(&address, 100).unwrap();
        assert_eq!(registry.active_validators(), vec![address]);
        assert_eq!(registry.get(&address).unwrap().validation_power, 100);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut registry = ValidatorRegistry::new();
        let address = Address::from_low_u64(1);
        registry.register(address, fingerprint(1), 0).unwrap();

        assert_eq!(
            registry.register(address, fingerprint(2), 0).unwrap_err(),
            ConsensusError::ValidatorAlreadyExists(address)
        );
    }

    #[test]
    fn test_one_device_one_validator() {
        let mut registry = ValidatorRegistry::new();
        let first = Address::from_low_u64(1);
        registry.register(first, fingerprint(7), 0).unwrap();

        // Taken while the first registration still awaits authorization
        for n in 2..=3 {
            assert_eq!(
                registry.register(Address::from_low_u64(n), fingerprint(7), 0).unwrap_err(),
                ConsensusError::DuplicateFingerprint(fingerprint(7))
            );
        }

        registry.authorize(&first, 10).unwrap();
        registry.deauthorize(&first).unwrap();
        assert!(registry.register(Address::from_low_u64(4), fingerprint(7), 0).is_err());

        let sharing = registry.all_validators().iter()
            .filter(|v| v.device_fingerprint == fingerprint(7))
            .count();
        assert_eq!(sharing, 1);
    }

    #[test]
    fn test_blacklisting_releases_the_device() {
        let mut registry = ValidatorRegistry::new();
        let first = Address::from_low_u64(1);
        registry.register(first, fingerprint(7), 0).unwrap();
        registry.blacklist(&first).unwrap();

        let second = Address::from_low_u64(2);
        registry.register(second, fingerprint(7), 0).unwrap();
        registry.authorize(&second, 10).unwrap();
        assert_eq!(registry.active_validators(), vec![second]);
    }

    #[test]
    fn test_power_bounds_and_fixed_power() {
        let mut registry = ValidatorRegistry::new();
        let address = Address::from_low_u64(1);
        registry.register(address, fingerprint(1), 0).unwrap();

        assert!(matches!(registry.authorize(&address, 0), Err(ConsensusError::InvalidPower(_))));
        assert!(matches!(registry.authorize(&address, 1001), Err(ConsensusError::InvalidPower(_))));

        registry.authorize(&address, 250).unwrap();
        assert_eq!(
            registry.authorize(&address, 250).unwrap_err(),
            ConsensusError::ValidatorAlreadyAuthorized(address)
        );

        registry.deauthorize(&address).unwrap();
        assert!(matches!(registry.authorize(&address, 300), Err(ConsensusError::InvalidPower(_))));
        registry.authorize(&address, 250).unwrap();
    }

    #[test]
    fn test_blacklisted_validator_is_inactive() {
        let mut registry = ValidatorRegistry::new();
        let address = Address::from_low_u64(1);
        registry.register(address, fingerprint(1), 0).unwrap();
        registry.authorize(&address, 10).unwrap();

        registry.blacklist(&address).unwrap();
        assert!(!registry.is_active(&address));
        assert!(registry.active_validators().is_empty());
    }

    #[test]
    fn test_active_validators_keep_registration_order() {
        let mut registry = ValidatorRegistry::new();
        for n in [5u64, 3, 9, 1] {
            let address = Address::from_low_u64(n);
            registry.register(address, fingerprint(n), 0).unwrap();
            registry.authorize(&address, 10).unwrap();
        }
        registry.deauthorize(&Address::from_low_u64(9)).unwrap();

        let order: Vec<_> = registry.active_validators();
        assert_eq!(
            order,
            vec![Address::from_low_u64(5), Address::from_low_u64(3), Address::from_low_u64(1)]
        );
    }

    #[test]
    fn test_performance_tracking() {
        let mut node = ValidatorNode::new(Address::from_low_u64(1), fingerprint(1), 0);
        node.record_success(200, 1);
        node.record_success(1200, 2);
        assert_eq!(node.avg_latency_ms, 300);
        assert_eq!(node.reputation, 510);

        node.record_failure(3);
        assert_eq!(node.success_rate, 666);
        assert_eq!(node.reputation, 490);
    }

    #[test]
    fn test_reputation_bounded() {
        let mut node = ValidatorNode::new(Address::from_low_u64(1), fingerprint(1), 0);
        for _ in 0..200 {
            node.record_success(10, 0);
        }
        assert_eq!(node.reputation, 1000);
        for _ in 0..100 {
            node.record_failure(0);
        }
        assert_eq!(node.reputation, 0);
    }
}
