//! Pool balance ledger
//!
//! Holds the custodied balance of one value type for one pool. Credits take
//! a [`Coin`] in, debits hand a [`Coin`] out, so value is conserved by
//! construction: the ledger can never pay out more than was paid in.

use crate::{coin::Coin, error::Refused, types::ValueType, Error, Result};
use std::fmt;
use std::marker::PhantomData;

/// Balance of one pool
pub struct Ledger<V: ValueType> {
    balance: u64,
    _value_type: PhantomData<fn() -> V>,
}

impl<V: ValueType> Ledger<V> {
    /// Empty ledger
    pub fn new() -> Self {
        Self::with_balance(0)
    }

    /// Rebuild from a persisted balance
    pub(crate) fn with_balance(balance: u64) -> Self {
        Self {
            balance,
            _value_type: PhantomData,
        }
    }

    /// Current balance
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Credit a coin into the pool
    ///
    /// Refuses with `Overflow`, handing the coin back, if the balance would
    /// not fit in a `u64`.
    pub fn credit(&mut self, coin: Coin<V>) -> std::result::Result<(), Refused<Coin<V>>> {
        match self.balance.checked_add(coin.value()) {
            Some(balance) => {
                self.balance = balance;
                let _ = coin.into_value();
                Ok(())
            }
            None => Err(Refused::new(
                Error::Overflow(format!(
                    "pool balance {} + {} {}",
                    self.balance,
                    coin.value(),
                    V::SYMBOL
                )),
                coin,
            )),
        }
    }

    /// Debit `amount` out of the pool
    pub fn debit(&mut self, amount: u64) -> Result<Coin<V>> {
        if self.balance < amount {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(Coin::from_external(amount))
    }

    /// Check a debit of `amount` would succeed, without applying it
    pub fn ensure_covers(&self, amount: u64) -> Result<()> {
        if self.balance < amount {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }
}

impl<V: ValueType> Default for Ledger<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ValueType> fmt::Debug for Ledger<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("value_type", &V::SYMBOL)
            .field("balance", &self.balance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Apt;
    impl ValueType for Apt {
        const SYMBOL: &'static str = "APT";
    }

    #[test]
    fn test_credit_then_debit() {
        let mut ledger = Ledger::<Apt>::new();
        ledger.credit(Coin::from_external(100)).unwrap();
        assert_eq!(ledger.balance(), 100);

        let out = ledger.debit(40).unwrap();
        assert_eq!(out.value(), 40);
        assert_eq!(ledger.balance(), 60);
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let mut ledger = Ledger::<Apt>::with_balance(10);
        let err = ledger.debit(11).unwrap_err();
        assert_eq!(err, Error::InsufficientBalance { requested: 11, available: 10 });
        assert_eq!(ledger.balance(), 10);
        assert!(ledger.ensure_covers(10).is_ok());
    }

    #[test]
    fn test_credit_overflow_returns_coin() {
        let mut ledger = Ledger::<Apt>::with_balance(u64::MAX - 1);
        let refused = ledger.credit(Coin::from_external(2)).unwrap_err();
        assert_eq!(refused.returned.value(), 2);
        assert_eq!(ledger.balance(), u64::MAX - 1);
    }

    #[test]
    fn test_debit_zero_is_allowed() {
        let mut ledger = Ledger::<Apt>::new();
        assert_eq!(ledger.debit(0).unwrap().value(), 0);
    }
}
