//! Withdraw proofs: bounded, mergeable claims against one pool
//!
//! A proof is minted only by supply, paired with a ledger credit of the same
//! amount, and drawn down only by extraction, paired with an equal debit.
//! Proofs can be merged and split freely within one pool. A proof must be
//! destroyed explicitly: [`WithdrawProof::destroy_zero`] for an exhausted
//! proof, or [`WithdrawProof::destroy`] to abandon an outstanding claim.

use crate::{
    error::Refused,
    types::{PoolId, ValueType},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Claim on up to `amount` of one pool's balance
#[must_use = "withdraw proofs must be destroyed explicitly"]
pub struct WithdrawProof<V: ValueType> {
    pool: PoolId,
    amount: u64,
    _value_type: PhantomData<fn() -> V>,
}

/// Audit record of an abandoned claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abandoned {
    /// Pool the claim was against
    pub pool: PoolId,
    /// Unspent amount discarded
    pub amount: u64,
}

impl<V: ValueType> WithdrawProof<V> {
    /// Mint after the ledger was credited with `amount`
    pub(crate) fn mint_from_supply(pool: PoolId, amount: u64) -> Self {
        Self {
            pool,
            amount,
            _value_type: PhantomData,
        }
    }

    /// Rebuild a claim recorded in a snapshot
    pub(crate) fn reinstate(pool: PoolId, amount: u64) -> Self {
        tracing::debug!(pool = %pool, value_type = V::SYMBOL, amount, "Withdraw proof reinstated");
        Self::mint_from_supply(pool, amount)
    }

    /// Pool this proof claims against
    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    /// Claimable amount
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Merge `src` into this proof, consuming it
    ///
    /// Refuses with `PoolMismatch` when the proofs claim against different
    /// pools; `src` is handed back unchanged.
    pub fn merge(&mut self, mut src: Self) -> std::result::Result<(), Refused<Self>> {
        if src.pool != self.pool {
            let error = Error::PoolMismatch {
                expected: self.pool,
                actual: src.pool,
            };
            return Err(Refused::new(error, src));
        }

        let total = match self.amount.checked_add(src.amount) {
            Some(total) => total,
            None => {
                let error = Error::Overflow(format!("proof {} + {}", self.amount, src.amount));
                return Err(Refused::new(error, src));
            }
        };

        self.amount = total;
        src.amount = 0;
        Ok(())
    }

    /// Move `amount` into a new proof for the same pool
    pub fn split(&mut self, amount: u64) -> Result<Self> {
        self.ensure_holds(amount)?;
        self.amount -= amount;
        Ok(Self::mint_from_supply(self.pool, amount))
    }

    /// Check this proof covers `amount` of `pool`
    pub fn ensure_covers(&self, pool: PoolId, amount: u64) -> Result<()> {
        if self.pool != pool {
            return Err(Error::PoolMismatch {
                expected: pool,
                actual: self.pool,
            });
        }
        self.ensure_holds(amount)
    }

    fn ensure_holds(&self, amount: u64) -> Result<()> {
        if self.amount < amount {
            return Err(Error::InsufficientClaim {
                requested: amount,
                held: self.amount,
            });
        }
        Ok(())
    }

    /// Draw down after the matching ledger debit succeeded
    pub(crate) fn consume(&mut self, amount: u64) {
        debug_assert!(self.amount >= amount);
        self.amount -= amount;
    }

    /// Release a proof whose claim was persisted, returning its amount
    pub(crate) fn retire_persisted(mut self) -> u64 {
        std::mem::take(&mut self.amount)
    }

    /// Destroy an exhausted proof
    pub fn destroy_zero(self) -> std::result::Result<(), Refused<Self>> {
        if self.amount != 0 {
            let error = Error::NonZeroDestruction {
                pool: self.pool,
                amount: self.amount,
            };
            return Err(Refused::new(error, self));
        }
        Ok(())
    }

    /// Destroy unconditionally, discarding any outstanding claim
    ///
    /// The discarded value stays in the pool ledger with no claimant.
    pub fn destroy(mut self) -> Abandoned {
        let abandoned = Abandoned {
            pool: self.pool,
            amount: self.amount,
        };
        if abandoned.amount > 0 {
            tracing::warn!(
                pool = %abandoned.pool,
                value_type = V::SYMBOL,
                amount = abandoned.amount,
                "Withdraw proof abandoned with outstanding claim"
            );
        }
        self.amount = 0;
        abandoned
    }
}

impl<V: ValueType> Drop for WithdrawProof<V> {
    fn drop(&mut self) {
        if self.amount != 0 {
            tracing::error!(
                pool = %self.pool,
                value_type = V::SYMBOL,
                amount = self.amount,
                "Withdraw proof dropped with outstanding claim"
            );
        }
    }
}

impl<V: ValueType> fmt::Debug for WithdrawProof<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithdrawProof")
            .field("value_type", &V::SYMBOL)
            .field("pool", &self.pool)
            .field("amount", &self.amount)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Usdt;
    impl ValueType for Usdt {
        const SYMBOL: &'static str = "USDT";
    }

    fn pool(byte: u8) -> PoolId {
        PoolId::from_bytes([byte; 32])
    }

    #[test]
    fn test_merge_same_pool() {
        let mut dst = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 30);
        let src = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 12);
        dst.merge(src).unwrap();
        assert_eq!(dst.amount(), 42);
        let _ = dst.destroy();
    }

    #[test]
    fn test_merge_across_pools_returns_source() {
        let mut dst = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 30);
        let src = WithdrawProof::<Usdt>::mint_from_supply(pool(2), 12);

        let (error, src) = dst.merge(src).unwrap_err().into_parts();
        assert_eq!(error, Error::PoolMismatch { expected: pool(1), actual: pool(2) });
        assert_eq!(dst.amount(), 30);
        assert_eq!(src.amount(), 12);

        let _ = dst.destroy();
        let _ = src.destroy();
    }

    #[test]
    fn test_split_keeps_total() {
        let mut proof = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 50);
        let part = proof.split(20).unwrap();
        assert_eq!(proof.amount() + part.amount(), 50);
        assert_eq!(part.pool_id(), proof.pool_id());

        assert_eq!(
            proof.split(31).unwrap_err(),
            Error::InsufficientClaim { requested: 31, held: 30 }
        );

        let _ = proof.destroy();
        let _ = part.destroy();
    }

    #[test]
    fn test_ensure_covers() {
        let proof = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 5);
        assert!(proof.ensure_covers(pool(1), 5).is_ok());
        assert!(matches!(
            proof.ensure_covers(pool(1), 6),
            Err(Error::InsufficientClaim { .. })
        ));
        assert!(matches!(
            proof.ensure_covers(pool(3), 1),
            Err(Error::PoolMismatch { .. })
        ));
        let _ = proof.destroy();
    }

    #[test]
    fn test_destroy_zero_rejects_outstanding_claim() {
        let proof = WithdrawProof::<Usdt>::mint_from_supply(pool(1), 1);
        let (error, proof) = proof.destroy_zero().unwrap_err().into_parts();
        assert_eq!(error, Error::NonZeroDestruction { pool: pool(1), amount: 1 });

        let mut proof = proof;
        proof.consume(1);
        assert!(proof.destroy_zero().is_ok());
    }

    #[test]
    fn test_destroy_reports_abandoned_amount() {
        let proof = WithdrawProof::<Usdt>::mint_from_supply(pool(4), 9);
        assert_eq!(proof.destroy(), Abandoned { pool: pool(4), amount: 9 });
    }
}
