//! Account-keyed collections of capabilities and proofs
//!
//! A store holds at most one object per `(owner, pool)` slot. Moving an
//! object between owners is a take-then-give under a single lock, so the same
//! object is never visible in two slots.

use crate::{
    capability::RootCapability,
    error::Refused,
    pool::ClaimRecord,
    proof::WithdrawProof,
    types::{Address, PoolId, ValueType},
    Error, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

type Slot = (Address, PoolId);

/// Root capabilities held per account
pub struct CapabilityStore<V: ValueType> {
    slots: Mutex<HashMap<Slot, RootCapability<V>>>,
}

impl<V: ValueType> CapabilityStore<V> {
    /// Empty store
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Place `capability` in `owner`'s collection
    pub fn give(
        &self,
        owner: Address,
        capability: RootCapability<V>,
    ) -> std::result::Result<(), Refused<RootCapability<V>>> {
        let mut slots = self.slots.lock();
        let slot = (owner, capability.pool_id());
        if slots.contains_key(&slot) {
            let error = Error::AlreadyExists(format!("capability for {} held by {}", slot.1, owner));
            return Err(Refused::new(error, capability));
        }
        slots.insert(slot, capability);

        tracing::debug!(owner = %owner, pool = %slot.1, "Capability stored");

        Ok(())
    }

    /// Remove the capability for `pool` from `owner`'s collection
    pub fn take(&self, owner: Address, pool: PoolId) -> Result<RootCapability<V>> {
        self.slots
            .lock()
            .remove(&(owner, pool))
            .ok_or_else(|| Error::NotFound(format!("capability for {} held by {}", pool, owner)))
    }

    /// Move the capability for `pool` from `from` to `to` atomically
    pub fn transfer(&self, from: Address, to: Address, pool: PoolId) -> Result<()> {
        let mut slots = self.slots.lock();
        if from == to {
            return if slots.contains_key(&(from, pool)) {
                Ok(())
            } else {
                Err(Error::NotFound(format!("capability for {} held by {}", pool, from)))
            };
        }
        if slots.contains_key(&(to, pool)) {
            return Err(Error::AlreadyExists(format!("capability for {} held by {}", pool, to)));
        }

        let capability = slots
            .remove(&(from, pool))
            .ok_or_else(|| Error::NotFound(format!("capability for {} held by {}", pool, from)))?;
        slots.insert((to, pool), capability);

        tracing::info!(pool = %pool, from = %from, to = %to, "Capability transferred");

        Ok(())
    }

    /// Run `f` with a borrowed capability, leaving it in place
    pub fn with_capability<R>(
        &self,
        owner: Address,
        pool: PoolId,
        f: impl FnOnce(&RootCapability<V>) -> R,
    ) -> Result<R> {
        let slots = self.slots.lock();
        let capability = slots
            .get(&(owner, pool))
            .ok_or_else(|| Error::NotFound(format!("capability for {} held by {}", pool, owner)))?;
        Ok(f(capability))
    }

    /// Current holder of the capability for `pool`
    pub fn holder_of(&self, pool: PoolId) -> Option<Address> {
        self.slots
            .lock()
            .keys()
            .find(|(_, held)| *held == pool)
            .map(|(owner, _)| *owner)
    }

    /// Number of slots holding a capability for `pool`
    pub fn holders(&self, pool: PoolId) -> usize {
        self.slots.lock().keys().filter(|(_, held)| *held == pool).count()
    }

    /// Put the capability for `pool` back with its recorded holder
    ///
    /// Refuses with `AlreadyExists` if any slot already holds one, so a pool
    /// never has two live capabilities.
    pub(crate) fn reinstate(&self, owner: Address, pool: PoolId) -> Result<()> {
        let mut slots = self.slots.lock();
        if let Some((holder, _)) = slots.keys().find(|(_, held)| *held == pool) {
            return Err(Error::AlreadyExists(format!("capability for {} held by {}", pool, holder)));
        }
        slots.insert((owner, pool), RootCapability::reinstate(pool));
        Ok(())
    }

    /// Release every capability once its location has been saved
    ///
    /// Returns the released `(pool, holder)` pairs, sorted by pool.
    pub fn into_locations(self) -> Vec<(PoolId, Address)> {
        let mut locations: Vec<_> = self
            .slots
            .into_inner()
            .into_iter()
            .map(|((owner, pool), capability)| {
                capability.retire_persisted();
                (pool, owner)
            })
            .collect();
        locations.sort();
        locations
    }
}

impl<V: ValueType> Default for CapabilityStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ValueType> fmt::Debug for CapabilityStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityStore")
            .field("value_type", &V::SYMBOL)
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

/// Withdraw proofs auto-stored per account, one merged proof per pool
pub struct ProofStore<V: ValueType> {
    slots: Mutex<HashMap<Slot, WithdrawProof<V>>>,
}

impl<V: ValueType> ProofStore<V> {
    /// Empty store
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Store `proof` for `owner`, merging into any proof already held
    pub fn deposit(
        &self,
        owner: Address,
        proof: WithdrawProof<V>,
    ) -> std::result::Result<(), Refused<WithdrawProof<V>>> {
        let mut slots = self.slots.lock();
        let slot = (owner, proof.pool_id());
        match slots.get_mut(&slot) {
            Some(held) => held.merge(proof)?,
            None => {
                slots.insert(slot, proof);
            }
        }
        Ok(())
    }

    /// Remove `owner`'s proof for `pool`
    pub fn take(&self, owner: Address, pool: PoolId) -> Result<WithdrawProof<V>> {
        self.slots
            .lock()
            .remove(&(owner, pool))
            .ok_or_else(|| Error::NotFound(format!("proof for {} held by {}", pool, owner)))
    }

    /// Claimable amount `owner` holds against `pool`
    pub fn amount_of(&self, owner: Address, pool: PoolId) -> u64 {
        self.slots
            .lock()
            .get(&(owner, pool))
            .map_or(0, WithdrawProof::amount)
    }

    /// Sum of all stored claims against `pool`
    pub fn total_for(&self, pool: PoolId) -> u64 {
        self.slots
            .lock()
            .iter()
            .filter(|((_, held), _)| *held == pool)
            .map(|(_, proof)| proof.amount())
            .sum()
    }

    /// Number of slots holding a proof for `pool`
    pub fn holders(&self, pool: PoolId) -> usize {
        self.slots.lock().keys().filter(|(_, held)| *held == pool).count()
    }

    /// Nonzero claims against `pool`, sorted by holder
    pub fn claims_for(&self, pool: PoolId) -> Vec<ClaimRecord> {
        let mut claims: Vec<_> = self
            .slots
            .lock()
            .iter()
            .filter(|((_, held), proof)| *held == pool && proof.amount() > 0)
            .map(|((holder, _), proof)| ClaimRecord {
                holder: *holder,
                amount: proof.amount(),
            })
            .collect();
        claims.sort_by_key(|claim| claim.holder);
        claims
    }

    /// Rebuild the recorded claims against `pool`
    ///
    /// Refuses with `AlreadyExists` if any proof for `pool` is already
    /// stored. Records for the same holder are summed; zero amounts are
    /// skipped.
    pub(crate) fn reinstate(&self, pool: PoolId, claims: &[ClaimRecord]) -> Result<()> {
        let mut merged: HashMap<Address, u64> = HashMap::new();
        for claim in claims.iter().filter(|claim| claim.amount > 0) {
            let held = merged.entry(claim.holder).or_insert(0);
            *held = held
                .checked_add(claim.amount)
                .ok_or_else(|| Error::Overflow(format!("claims of {} against {}", claim.holder, pool)))?;
        }

        let mut slots = self.slots.lock();
        if slots.keys().any(|(_, held)| *held == pool) {
            return Err(Error::AlreadyExists(format!("proofs for {}", pool)));
        }
        for (holder, amount) in merged {
            slots.insert((holder, pool), WithdrawProof::reinstate(pool, amount));
        }
        Ok(())
    }

    /// Destroy `owner`'s proof for `pool` if it is exhausted
    pub fn remove_if_empty(&self, owner: Address, pool: PoolId) -> bool {
        let mut slots = self.slots.lock();
        if slots.get(&(owner, pool)).map_or(false, |proof| proof.amount() == 0) {
            if let Some(proof) = slots.remove(&(owner, pool)) {
                return proof.destroy_zero().is_ok();
            }
        }
        false
    }

    /// Release every proof once its claim has been saved
    ///
    /// Returns the released claims, sorted by pool then holder.
    pub fn into_claims(self) -> Vec<(PoolId, ClaimRecord)> {
        let mut claims: Vec<_> = self
            .slots
            .into_inner()
            .into_iter()
            .map(|((holder, pool), proof)| {
                let amount = proof.retire_persisted();
                (pool, ClaimRecord { holder, amount })
            })
            .collect();
        claims.sort_by_key(|(pool, claim)| (*pool, claim.holder));
        claims
    }
}

impl<V: ValueType> Default for ProofStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ValueType> fmt::Debug for ProofStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofStore")
            .field("value_type", &V::SYMBOL)
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coin::Coin, pool::Pool};

    struct Btc;
    impl ValueType for Btc {
        const SYMBOL: &'static str = "BTC";
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn pool_id(byte: u8) -> PoolId {
        PoolId::from_bytes([byte; 32])
    }

    #[test]
    fn test_capability_moves_between_owners() {
        let store = CapabilityStore::<Btc>::new();
        let (_pool, cap) = Pool::<Btc>::create(pool_id(1), addr(1), None);

        store.give(addr(1), cap).unwrap();
        assert_eq!(store.holders(pool_id(1)), 1);
        assert_eq!(store.holder_of(pool_id(1)), Some(addr(1)));

        store.transfer(addr(1), addr(2), pool_id(1)).unwrap();
        assert_eq!(store.holders(pool_id(1)), 1);
        assert_eq!(store.holder_of(pool_id(1)), Some(addr(2)));
        assert!(matches!(store.take(addr(1), pool_id(1)), Err(Error::NotFound(_))));

        let cap = store.take(addr(2), pool_id(1)).unwrap();
        assert_eq!(store.holders(pool_id(1)), 0);
        cap.destroy();
    }

    #[test]
    fn test_transfer_into_occupied_slot_changes_nothing() {
        let store = CapabilityStore::<Btc>::new();
        let (_pool, cap) = Pool::<Btc>::create(pool_id(1), addr(1), None);
        store.give(addr(1), cap).unwrap();

        assert!(matches!(
            store.transfer(addr(3), addr(1), pool_id(1)),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            store.transfer(addr(3), addr(2), pool_id(1)),
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.holder_of(pool_id(1)), Some(addr(1)));

        store.take(addr(1), pool_id(1)).unwrap().destroy();
    }

    #[test]
    fn test_with_capability_borrows_in_place() {
        let store = CapabilityStore::<Btc>::new();
        let (mut pool, cap) = Pool::<Btc>::create(pool_id(1), addr(1), None);
        let mut wallet = Coin::from_external(10);
        pool.repay(addr(5), &mut wallet, 10).unwrap();
        store.give(addr(1), cap).unwrap();

        let payout = store
            .with_capability(addr(1), pool_id(1), |cap| pool.withdraw_root(cap, addr(9), 4))
            .unwrap()
            .unwrap();
        assert_eq!(payout.amount(), 4);
        assert_eq!(store.holders(pool_id(1)), 1);

        store.take(addr(1), pool_id(1)).unwrap().destroy();
    }

    #[test]
    fn test_proof_deposit_merges_per_pool() {
        let store = ProofStore::<Btc>::new();
        let (mut pool, cap) = Pool::<Btc>::create(pool_id(1), addr(1), None);
        let mut wallet = Coin::from_external(100);

        store.deposit(addr(2), pool.supply(addr(2), &mut wallet, 30).unwrap()).unwrap();
        store.deposit(addr(2), pool.supply(addr(2), &mut wallet, 25).unwrap()).unwrap();
        store.deposit(addr(3), pool.supply(addr(3), &mut wallet, 5).unwrap()).unwrap();

        assert_eq!(store.amount_of(addr(2), pool_id(1)), 55);
        assert_eq!(store.total_for(pool_id(1)), 60);
        assert_eq!(store.total_for(pool_id(1)), pool.balance());

        let mut proof = store.take(addr(3), pool_id(1)).unwrap();
        let _ = pool.withdraw_local(addr(3), &mut proof, 5).unwrap();
        store.deposit(addr(3), proof).unwrap();
        assert!(store.remove_if_empty(addr(3), pool_id(1)));
        assert!(!store.remove_if_empty(addr(2), pool_id(1)));

        let _ = store.take(addr(2), pool_id(1)).unwrap().destroy();
        cap.destroy();
    }

    #[test]
    fn test_reinstate_keeps_one_capability() {
        let store = CapabilityStore::<Btc>::new();
        store.reinstate(addr(2), pool_id(1)).unwrap();
        assert_eq!(store.holder_of(pool_id(1)), Some(addr(2)));

        assert!(matches!(
            store.reinstate(addr(3), pool_id(1)),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.holders(pool_id(1)), 1);

        store.reinstate(addr(3), pool_id(2)).unwrap();
        assert_eq!(
            store.into_locations(),
            vec![(pool_id(1), addr(2)), (pool_id(2), addr(3))]
        );
    }

    #[test]
    fn test_claims_reinstated_and_released() {
        let store = ProofStore::<Btc>::new();
        let claims = vec![
            ClaimRecord { holder: addr(4), amount: 10 },
            ClaimRecord { holder: addr(2), amount: 7 },
            ClaimRecord { holder: addr(4), amount: 5 },
            ClaimRecord { holder: addr(9), amount: 0 },
        ];
        store.reinstate(pool_id(1), &claims).unwrap();

        assert_eq!(store.amount_of(addr(4), pool_id(1)), 15);
        assert_eq!(store.holders(pool_id(1)), 2);
        assert_eq!(
            store.claims_for(pool_id(1)),
            vec![
                ClaimRecord { holder: addr(2), amount: 7 },
                ClaimRecord { holder: addr(4), amount: 15 },
            ]
        );
        assert!(matches!(
            store.reinstate(pool_id(1), &claims[..1]),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.total_for(pool_id(1)), 22);

        let overflow = [
            ClaimRecord { holder: addr(1), amount: u64::MAX },
            ClaimRecord { holder: addr(1), amount: 1 },
        ];
        assert!(matches!(store.reinstate(pool_id(2), &overflow), Err(Error::Overflow(_))));
        assert_eq!(store.holders(pool_id(2)), 0);

        let released = store.into_claims();
        assert_eq!(released.len(), 2);
        assert_eq!(released[1], (pool_id(1), ClaimRecord { holder: addr(4), amount: 15 }));
    }
}
