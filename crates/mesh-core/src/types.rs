// mesh-core/src/types.rs

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Identifier of an external network a transfer can be routed to
pub type NetworkId = u32;

/// Shard index, assigned in creation order starting at zero
pub type ShardId = u16;

/// Fixed-point ratio with scale 1000 (1000 = 100%, 1.0x)
pub type PerMille = u64;

/// Token amount in base units
///
/// All arithmetic saturates; balances never wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const MAX: Amount = Amount(u128::MAX);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value as u128)
    }

    pub fn inner(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `self * numerator / denominator`, saturating, denominator floored at 1
    pub fn mul_div(&self, numerator: u128, denominator: u128) -> Amount {
        Amount(crate::fixed::mul_div(self.0, numerator, denominator))
    }

    /// Scale by a per-mille factor
    pub fn scale(&self, factor: PerMille) -> Amount {
        self.mul_div(factor as u128, crate::SCALE as u128)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        self.saturating_add(other)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        self.saturating_sub(other)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Economic emergency level derived from the liquidity health index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmergencyLevel {
    /// Normal operation
    #[default]
    None,
    /// Fees capped, rewards still flow
    Emergency,
    /// New consensus proofs and routes are refused
    Halt,
}

impl EmergencyLevel {
    pub fn is_active(&self) -> bool {
        !matches!(self, EmergencyLevel::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_split_sums_back() {
        let fee = Amount::from_u64(1_000);
        let host_share = fee.scale(700);
        let pool_share = fee.checked_sub(&host_share).unwrap();
        assert_eq!(pool_share, Amount::from_u64(300));
        assert_eq!([host_share, pool_share].into_iter().sum::<Amount>(), fee);
        assert_eq!(host_share.checked_add(&Amount::MAX), None);
    }

    #[test]
    fn test_amount_saturates() {
        assert_eq!(Amount::from_u64(50) - Amount::from_u64(100), Amount::zero());
        assert_eq!(Amount::MAX + Amount::from_u64(1), Amount::MAX);
        assert!(Amount::from_u64(50).checked_sub(&Amount::from_u64(100)).is_none());
    }

    #[test]
    fn test_amount_scale() {
        let fee = Amount::from_u64(10_000);
        assert_eq!(fee.scale(700), Amount::from_u64(7_000));
        assert_eq!(fee.mul_div(1, 0), Amount::from_u64(10_000));
    }

    #[test]
    fn test_emergency_levels_ordered() {
        assert!(EmergencyLevel::Halt > EmergencyLevel::Emergency);
        assert!(!EmergencyLevel::None.is_active());
        assert!(EmergencyLevel::Emergency.is_active());
    }
}
