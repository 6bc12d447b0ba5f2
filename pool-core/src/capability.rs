//! Root capability: unrestricted debit rights over one pool
//!
//! A `RootCapability<V>` is minted exactly once, when its pool is created.
//! It is neither `Clone` nor `Default` and its constructor is private to the
//! crate, so holding one is proof of authority. Using it never consumes it;
//! only [`RootCapability::destroy`] does.

use crate::{
    types::{PoolId, ValueType},
    Error, Result,
};
use std::fmt;
use std::marker::PhantomData;

/// Exclusive authorization token bound to one pool
#[must_use = "dropping a root capability loses control of its pool"]
pub struct RootCapability<V: ValueType> {
    pool: PoolId,
    _value_type: PhantomData<fn() -> V>,
}

impl<V: ValueType> RootCapability<V> {
    pub(crate) fn mint(pool: PoolId) -> Self {
        tracing::info!(pool = %pool, value_type = V::SYMBOL, "Root capability minted");
        Self {
            pool,
            _value_type: PhantomData,
        }
    }

    /// Rebuild the capability recorded in a snapshot
    pub(crate) fn reinstate(pool: PoolId) -> Self {
        tracing::info!(pool = %pool, value_type = V::SYMBOL, "Root capability reinstated");
        Self {
            pool,
            _value_type: PhantomData,
        }
    }

    /// Pool this capability controls
    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    /// Fail with `PoolMismatch` unless bound to `pool`
    pub fn ensure_bound_to(&self, pool: PoolId) -> Result<()> {
        if self.pool != pool {
            return Err(Error::PoolMismatch {
                expected: pool,
                actual: self.pool,
            });
        }
        Ok(())
    }

    /// Consume the capability irreversibly
    pub fn destroy(self) {
        tracing::info!(pool = %self.pool, value_type = V::SYMBOL, "Root capability destroyed");
        std::mem::forget(self);
    }

    /// Release a capability whose location was persisted
    pub(crate) fn retire_persisted(self) {
        tracing::debug!(pool = %self.pool, value_type = V::SYMBOL, "Root capability released after save");
        std::mem::forget(self);
    }
}

impl<V: ValueType> Drop for RootCapability<V> {
    fn drop(&mut self) {
        tracing::error!(
            pool = %self.pool,
            value_type = V::SYMBOL,
            "Root capability dropped without destroy"
        );
    }
}

impl<V: ValueType> fmt::Debug for RootCapability<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCapability")
            .field("value_type", &V::SYMBOL)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Eth;
    impl ValueType for Eth {
        const SYMBOL: &'static str = "ETH";
    }

    #[test]
    fn test_bound_pool_check() {
        let pool = PoolId::from_bytes([1u8; 32]);
        let other = PoolId::from_bytes([2u8; 32]);
        let cap = RootCapability::<Eth>::mint(pool);

        assert_eq!(cap.pool_id(), pool);
        assert!(cap.ensure_bound_to(pool).is_ok());
        assert_eq!(
            cap.ensure_bound_to(other).unwrap_err(),
            Error::PoolMismatch { expected: other, actual: pool }
        );

        cap.destroy();
    }
}
