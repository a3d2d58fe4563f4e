// mesh-core/src/ledger.rs

use crate::{Amount, CoreError, CoreResult};
use mesh_crypto::Address;
use std::collections::HashMap;

/// Token ledger consumed by the engine for fees and reward payouts.
///
/// Balance-holding rules (demurrage, transfer restrictions and so on) belong
/// to the implementor.
pub trait TokenLedger {
    fn debit(&mut self, account: &Address, amount: Amount) -> CoreResult<()>;

    fn credit(&mut self, account: &Address, amount: Amount) -> CoreResult<()>;

    fn balance(&self, account: &Address) -> Amount;
}

/// Plain balance map
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: HashMap<Address, Amount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with one funded account
    pub fn with_balance(account: Address, amount: Amount) -> Self {
        let mut ledger = Self::new();
        ledger.balances.insert(account, amount);
        ledger
    }

    /// Mint into an account
    pub fn fund(&mut self, account: Address, amount: Amount) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn total_supply(&self) -> Amount {
        self.balances.values().copied().sum()
    }
}

impl TokenLedger for InMemoryLedger {
    fn debit(&mut self, account: &Address, amount: Amount) -> CoreResult<()> {
        let available = self.balance(account);
        let remaining = available.checked_sub(&amount)
            .ok_or(CoreError::InsufficientBalance {
                account: *account,
                required: amount,
                available,
            })?;
        self.balances.insert(*account, remaining);
        Ok(())
    }

    fn credit(&mut self, account: &Address, amount: Amount) -> CoreResult<()> {
        let balance = self.balances.entry(*account).or_default();
        *balance = balance.checked_add(&amount)
            .ok_or_else(|| CoreError::ArithmeticOverflow(format!("balance of {}", account)))?;
        Ok(())
    }

    fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_and_credit() {
        let alice = Address::from_low_u64(1);
        let bob = Address::from_low_u64(2);
        let mut ledger = InMemoryLedger::with_balance(alice, Amount::from_u64(100));

        ledger.debit(&alice, Amount::from_u64(40)).unwrap();
        ledger.credit(&bob, Amount::from_u64(40)).unwrap();

        assert_eq!(ledger.balance(&alice), Amount::from_u64(60));
        assert_eq!(ledger.balance(&bob), Amount::from_u64(40));
        assert_eq!(ledger.total_supply(), Amount::from_u64(100));
    }

    #[test]
    fn test_overdraft_rejected_without_change() {
        let alice = Address::from_low_u64(1);
        let mut ledger = InMemoryLedger::with_balance(alice, Amount::from_u64(10));

        let err = ledger.debit(&alice, Amount::from_u64(11)).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(&alice), Amount::from_u64(10));
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let alice = Address::from_low_u64(1);
        let mut ledger = InMemoryLedger::with_balance(alice, Amount::MAX);
        assert!(ledger.credit(&alice, Amount::from_u64(1)).is_err());
    }
}
