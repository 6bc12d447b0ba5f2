//! Delivery of settled payouts to their destinations

use crate::Result;
use pool_core::{Address, Error, Payout, PoolHandle, Refused, ValueType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Receives value released by settled relay instructions
pub trait PayoutSink<V: ValueType>: Send + Sync {
    /// Take ownership of `payout`, or hand it back unchanged
    fn deliver(&self, payout: Payout<V>) -> std::result::Result<(), Refused<Payout<V>>>;
}

/// Deliver `payout` from `pool`, crediting it back to the pool if `sink`
/// refuses it
///
/// The refusal is returned as the error.
pub async fn deliver_or_return<V, S>(sink: &S, pool: &PoolHandle<V>, payout: Payout<V>) -> Result<()>
where
    V: ValueType,
    S: PayoutSink<V> + ?Sized,
{
    let (error, payout) = match sink.deliver(payout) {
        Ok(()) => return Ok(()),
        Err(refused) => refused.into_parts(),
    };

    let Payout { destination, mut coin } = payout;
    let amount = coin.value();
    match pool.repay(destination, &mut coin, amount).await {
        Ok(()) => tracing::warn!(
            pool = %pool.pool_id(),
            destination = %destination,
            amount,
            error = %error,
            "Payout refused, value returned to pool"
        ),
        Err(e) => tracing::error!(
            pool = %pool.pool_id(),
            destination = %destination,
            amount = coin.value(),
            error = %e,
            "Refused payout could not be returned"
        ),
    }
    let _ = coin.into_value();

    Err(error.into())
}

/// Destination balances in the host environment
pub struct ExternalBalances<V: ValueType> {
    balances: Mutex<HashMap<Address, u64>>,
    _value_type: PhantomData<fn() -> V>,
}

impl<V: ValueType> ExternalBalances<V> {
    /// Empty balances
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            _value_type: PhantomData,
        }
    }

    /// Value delivered to `address` so far
    pub fn balance_of(&self, address: Address) -> u64 {
        self.balances.lock().get(&address).copied().unwrap_or(0)
    }

    /// Total value delivered
    pub fn total(&self) -> u128 {
        self.balances.lock().values().map(|v| u128::from(*v)).sum()
    }
}

impl<V: ValueType> PayoutSink<V> for ExternalBalances<V> {
    fn deliver(&self, payout: Payout<V>) -> std::result::Result<(), Refused<Payout<V>>> {
        let destination = payout.destination;
        let amount = payout.amount();

        let mut balances = self.balances.lock();
        let held = balances.get(&destination).copied().unwrap_or(0);
        let Some(balance) = held.checked_add(amount) else {
            let error = Error::Overflow(format!("{} {} + {} {}", destination, held, amount, V::SYMBOL));
            return Err(Refused::new(error, payout));
        };
        balances.insert(destination, balance);
        let _ = payout.coin.into_value();

        tracing::debug!(destination = %destination, amount, value_type = V::SYMBOL, "Payout delivered");

        Ok(())
    }
}

impl<V: ValueType> Default for ExternalBalances<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ValueType> fmt::Debug for ExternalBalances<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBalances")
            .field("value_type", &V::SYMBOL)
            .field("accounts", &self.balances.lock().len())
            .finish()
    }
}
