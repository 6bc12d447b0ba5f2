//! Transferable fungible value held outside a pool

use crate::{error::Refused, types::ValueType, Error, Result};
use std::fmt;
use std::marker::PhantomData;

/// Fungible value of type `V`
///
/// Not `Clone`: value moves between holders, it is never duplicated.
#[must_use = "dropping a coin discards its value"]
pub struct Coin<V: ValueType> {
    value: u64,
    _value_type: PhantomData<fn() -> V>,
}

impl<V: ValueType> Coin<V> {
    /// Value entering from the host environment (external account balance)
    pub fn from_external(value: u64) -> Self {
        Self {
            value,
            _value_type: PhantomData,
        }
    }

    /// Empty coin
    pub fn zero() -> Self {
        Self::from_external(0)
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Take `amount` out into a new coin
    pub fn split(&mut self, amount: u64) -> Result<Self> {
        if self.value < amount {
            return Err(Error::InsufficientExternalBalance {
                requested: amount,
                held: self.value,
            });
        }
        self.value -= amount;
        Ok(Self::from_external(amount))
    }

    /// Absorb another coin
    pub fn join(&mut self, other: Self) -> std::result::Result<(), Refused<Self>> {
        match self.value.checked_add(other.value) {
            Some(total) => {
                self.value = total;
                Ok(())
            }
            None => Err(Refused::new(
                Error::Overflow(format!("{} + {} {}", self.value, other.value, V::SYMBOL)),
                other,
            )),
        }
    }

    /// Undo a `split` from this coin
    pub(crate) fn restore(&mut self, split: Self) {
        self.value += split.value;
    }

    /// Destroy an empty coin
    pub fn destroy_zero(self) -> std::result::Result<(), Refused<Self>> {
        if self.value != 0 {
            let error = Error::NonZeroCoin {
                value_type: V::SYMBOL,
                value: self.value,
            };
            return Err(Refused::new(error, self));
        }
        Ok(())
    }

    /// Release the value to the host environment
    pub fn into_value(self) -> u64 {
        self.value
    }
}

impl<V: ValueType> fmt::Debug for Coin<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coin<{}>({})", V::SYMBOL, self.value)
    }
}
