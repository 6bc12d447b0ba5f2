//! Pool aggregate
//!
//! Ties the ledger, relayer gate and nonce lanes of one pool together into
//! the operations depositors, relayers and the root capability holder call.
//! Every operation either commits all of its effects and appends one event,
//! or returns an error having changed nothing.

use crate::{
    capability::RootCapability,
    coin::Coin,
    error::Refused,
    events::{PoolEvent, PoolEventKind},
    ledger::Ledger,
    nonce::NonceLanes,
    proof::WithdrawProof,
    relayer::RelayerGate,
    types::{Address, Lane, Nonce, PoolId, ValueType},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value paid out of a pool to a destination
#[must_use = "a payout carries value that must be delivered"]
pub struct Payout<V: ValueType> {
    /// Recipient
    pub destination: Address,
    /// Paid value
    pub coin: Coin<V>,
}

impl<V: ValueType> Payout<V> {
    /// Amount paid
    pub fn amount(&self) -> u64 {
        self.coin.value()
    }
}

impl<V: ValueType> fmt::Debug for Payout<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payout")
            .field("destination", &self.destination)
            .field("coin", &self.coin)
            .finish()
    }
}

/// Outbound cross-domain request recorded for the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Requested lane
    pub lane: Lane,
    /// Per-pool outbound sequence number
    pub sequence: u64,
    /// Local requester
    pub requester: Address,
    /// Target domain identifier
    pub destination_domain: u16,
    /// Receiver on the target domain
    pub receiver: Address,
    /// Requested amount
    pub amount: u64,
}

/// Outstanding claim of one holder, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Account holding the proof
    pub holder: Address,
    /// Claimable amount
    pub amount: u64,
}

/// Persistable pool state
///
/// [`Pool::snapshot`] leaves `capability_holder` and `claims` empty; the
/// registry fills them from the token stores when saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Pool identity
    pub pool: PoolId,
    /// Value type symbol
    pub value_type: String,
    /// Owning authority
    pub owner: Address,
    /// Ledger balance
    pub balance: u64,
    /// Relayer gate
    pub gate: RelayerGate,
    /// Nonce lanes
    pub lanes: NonceLanes,
    /// Next outbound request sequence
    pub outbound_sequence: u64,
    /// Account holding the root capability
    pub capability_holder: Option<Address>,
    /// Stored proofs against this pool, sorted by holder
    pub claims: Vec<ClaimRecord>,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

/// One pool of value type `V`
pub struct Pool<V: ValueType> {
    id: PoolId,
    owner: Address,
    ledger: Ledger<V>,
    gate: RelayerGate,
    lanes: NonceLanes,
    outbound_sequence: u64,
    outbox: Vec<PoolEvent>,
}

impl<V: ValueType> Pool<V> {
    /// Create an empty pool and mint its root capability
    pub fn create(id: PoolId, owner: Address, max_pending_gaps: Option<u64>) -> (Self, RootCapability<V>) {
        let mut pool = Self {
            id,
            owner,
            ledger: Ledger::new(),
            gate: RelayerGate::new(),
            lanes: NonceLanes::new(max_pending_gaps),
            outbound_sequence: 0,
            outbox: Vec::new(),
        };
        pool.emit(PoolEventKind::PoolCreated { owner });

        tracing::info!(pool = %id, owner = %owner, value_type = V::SYMBOL, "Pool created");

        (pool, RootCapability::mint(id))
    }

    /// Rebuild a pool from a snapshot
    pub fn restore(snapshot: PoolSnapshot, max_pending_gaps: Option<u64>) -> Result<Self> {
        if snapshot.value_type != V::SYMBOL {
            return Err(Error::Corrupt(format!(
                "snapshot for {} holds {}, expected {}",
                snapshot.pool,
                snapshot.value_type,
                V::SYMBOL
            )));
        }

        let claimed = snapshot
            .claims
            .iter()
            .try_fold(0u64, |total, claim| total.checked_add(claim.amount));
        if claimed.is_none() {
            return Err(Error::Corrupt(format!("claims for {} overflow", snapshot.pool)));
        }

        let mut lanes = snapshot.lanes;
        lanes.set_gap_limit(max_pending_gaps);

        Ok(Self {
            id: snapshot.pool,
            owner: snapshot.owner,
            ledger: Ledger::with_balance(snapshot.balance),
            gate: snapshot.gate,
            lanes,
            outbound_sequence: snapshot.outbound_sequence,
            outbox: Vec::new(),
        })
    }

    /// Capture persistable state
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool: self.id,
            value_type: V::SYMBOL.to_string(),
            owner: self.owner,
            balance: self.ledger.balance(),
            gate: self.gate.clone(),
            lanes: self.lanes.clone(),
            outbound_sequence: self.outbound_sequence,
            capability_holder: None,
            claims: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    /// Pool identity
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Owning authority
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Ledger balance
    pub fn balance(&self) -> u64 {
        self.ledger.balance()
    }

    /// Authorized relayer
    pub fn relayer(&self) -> Option<Address> {
        self.gate.relayer()
    }

    /// Nonce lanes
    pub fn lanes(&self) -> &NonceLanes {
        &self.lanes
    }

    /// Take events committed since the last drain
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, kind: PoolEventKind) {
        self.outbox.push(PoolEvent::new(self.id, V::SYMBOL, kind));
    }

    // Inflows

    /// Supply `amount` from `source` and mint a proof for it
    pub fn supply(&mut self, depositor: Address, source: &mut Coin<V>, amount: u64) -> Result<WithdrawProof<V>> {
        let coin = source.split(amount)?;
        self.supply_coin(depositor, coin).map_err(|refused| {
            let (error, coin) = refused.into_parts();
            source.restore(coin);
            error
        })
    }

    /// Supply a whole coin and mint a proof for it
    pub fn supply_coin(
        &mut self,
        depositor: Address,
        coin: Coin<V>,
    ) -> std::result::Result<WithdrawProof<V>, Refused<Coin<V>>> {
        let amount = coin.value();
        self.ledger.credit(coin)?;
        self.emit(PoolEventKind::Supplied { depositor, amount });

        tracing::debug!(pool = %self.id, depositor = %depositor, amount, "Supplied");

        Ok(WithdrawProof::mint_from_supply(self.id, amount))
    }

    /// Supply `amount` from `source`, growing an existing proof
    pub fn supply_into(
        &mut self,
        depositor: Address,
        proof: &mut WithdrawProof<V>,
        source: &mut Coin<V>,
        amount: u64,
    ) -> Result<()> {
        proof.ensure_covers(self.id, 0)?;
        if proof.amount().checked_add(amount).is_none() {
            return Err(Error::Overflow(format!("proof {} + {}", proof.amount(), amount)));
        }

        let minted = self.supply(depositor, source, amount)?;
        proof.merge(minted)?;
        Ok(())
    }

    /// Credit `amount` from `source` without minting a claim
    pub fn repay(&mut self, payer: Address, source: &mut Coin<V>, amount: u64) -> Result<()> {
        let coin = source.split(amount)?;
        self.repay_coin(payer, coin).map_err(|refused| {
            let (error, coin) = refused.into_parts();
            source.restore(coin);
            error
        })
    }

    /// Credit a whole coin without minting a claim
    pub fn repay_coin(&mut self, payer: Address, coin: Coin<V>) -> std::result::Result<(), Refused<Coin<V>>> {
        let amount = coin.value();
        self.ledger.credit(coin)?;
        self.emit(PoolEventKind::Repaid { payer, amount });

        tracing::debug!(pool = %self.id, payer = %payer, amount, "Repaid");

        Ok(())
    }

    // Outflows

    /// Redeem `amount` of `proof` locally
    ///
    /// The proof is drawn down only when the ledger debit succeeds.
    pub fn withdraw_local(&mut self, holder: Address, proof: &mut WithdrawProof<V>, amount: u64) -> Result<Coin<V>> {
        proof.ensure_covers(self.id, amount)?;
        let coin = self.debit_for_holder(holder, amount)?;
        proof.consume(amount);
        Ok(coin)
    }

    fn debit_for_holder(&mut self, holder: Address, amount: u64) -> Result<Coin<V>> {
        let coin = self.ledger.debit(amount)?;
        self.emit(PoolEventKind::WithdrawnLocal { holder, amount });

        tracing::debug!(pool = %self.id, holder = %holder, amount, "Withdrawn locally");

        Ok(coin)
    }

    /// Settle a relayed withdraw
    pub fn withdraw_relay(
        &mut self,
        caller: &Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.settle_relay(Lane::Withdraw, caller, destination, amount, nonce)
    }

    /// Settle a relayed borrow
    pub fn borrow_relay(
        &mut self,
        caller: &Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.settle_relay(Lane::Borrow, caller, destination, amount, nonce)
    }

    /// Settle a relay instruction on `lane`
    ///
    /// Every precondition is checked before anything is committed, so a
    /// failed settlement leaves the nonce available for a later retry.
    pub fn settle_relay(
        &mut self,
        lane: Lane,
        caller: &Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.gate.require_relayer(caller)?;
        self.lanes.lane(lane).check(nonce)?;
        self.ledger.ensure_covers(amount)?;

        let acceptance = self.lanes.lane_mut(lane).accept(nonce)?;
        let coin = self.ledger.debit(amount)?;
        self.emit(PoolEventKind::RelaySettled {
            lane,
            nonce,
            destination,
            amount,
            acceptance,
        });

        tracing::debug!(
            pool = %self.id,
            lane = lane.as_str(),
            nonce,
            destination = %destination,
            amount,
            "Relay instruction settled"
        );

        Ok(Payout { destination, coin })
    }

    /// Withdraw with the root capability
    pub fn withdraw_root(
        &mut self,
        capability: &RootCapability<V>,
        destination: Address,
        amount: u64,
    ) -> Result<Payout<V>> {
        capability.ensure_bound_to(self.id)?;
        self.debit_for_root(destination, amount)
    }

    /// Ledger side of a root withdrawal; the capability was checked by the caller
    pub(crate) fn debit_for_root(&mut self, destination: Address, amount: u64) -> Result<Payout<V>> {
        let coin = self.ledger.debit(amount)?;
        self.emit(PoolEventKind::RootWithdrawn { destination, amount });

        tracing::info!(pool = %self.id, destination = %destination, amount, "Root withdrawal");

        Ok(Payout { destination, coin })
    }

    // Administration

    /// Replace the authorized relayer; only the owner may call
    pub fn set_relayer(&mut self, caller: &Address, relayer: Address) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::NotOwner(caller.to_string()));
        }

        let previous = self.gate.set_relayer(relayer);
        self.emit(PoolEventKind::RelayerChanged { previous, relayer });

        tracing::info!(pool = %self.id, relayer = %relayer, "Relayer changed");

        Ok(())
    }

    // Outbound requests

    /// Record a cross-domain withdraw, escrowing `amount` of `proof`
    ///
    /// The ledger is untouched; the relay settles the request later through
    /// [`Pool::withdraw_relay`].
    pub fn request_remote_withdraw(
        &mut self,
        requester: Address,
        proof: &mut WithdrawProof<V>,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    ) -> Result<RemoteRequest> {
        proof.ensure_covers(self.id, amount)?;
        let request = self.record_remote(Lane::Withdraw, requester, destination_domain, receiver, amount)?;
        proof.consume(amount);
        Ok(request)
    }

    /// Record a cross-domain borrow request
    pub fn request_remote_borrow(
        &mut self,
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    ) -> Result<RemoteRequest> {
        self.record_remote(Lane::Borrow, requester, destination_domain, receiver, amount)
    }

    fn record_remote(
        &mut self,
        lane: Lane,
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    ) -> Result<RemoteRequest> {
        let sequence = self.outbound_sequence;
        self.outbound_sequence = sequence
            .checked_add(1)
            .ok_or_else(|| Error::Overflow("outbound sequence".to_string()))?;

        let request = RemoteRequest {
            lane,
            sequence,
            requester,
            destination_domain,
            receiver,
            amount,
        };
        self.emit(PoolEventKind::RemoteRequested {
            lane,
            sequence,
            requester,
            destination_domain,
            receiver,
            amount,
        });

        tracing::debug!(pool = %self.id, lane = lane.as_str(), sequence, amount, "Remote request recorded");

        Ok(request)
    }
}

impl<V: ValueType> fmt::Debug for Pool<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("value_type", &V::SYMBOL)
            .field("owner", &self.owner)
            .field("balance", &self.ledger.balance())
            .field("relayer", &self.gate.relayer())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Usdc;
    impl ValueType for Usdc {
        const SYMBOL: &'static str = "USDC";
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn new_pool() -> (Pool<Usdc>, RootCapability<Usdc>) {
        Pool::create(PoolId::from_bytes([9u8; 32]), addr(1), None)
    }

    #[test]
    fn test_spec_scenario() {
        let owner = addr(1);
        let depositor = addr(2);
        let relayer = addr(3);
        let destination = addr(4);
        let (mut pool, cap) = new_pool();
        assert_eq!(pool.balance(), 0);

        let mut wallet = Coin::from_external(100);
        let mut proof = pool.supply(depositor, &mut wallet, 100).unwrap();
        assert_eq!(pool.balance(), 100);
        assert_eq!(proof.amount(), 100);

        let paid = pool.withdraw_local(depositor, &mut proof, 40).unwrap();
        assert_eq!(paid.value(), 40);
        assert_eq!(pool.balance(), 60);
        assert_eq!(proof.amount(), 60);

        assert!(matches!(
            pool.withdraw_relay(&relayer, destination, 10, 0),
            Err(Error::NotRelayer(_))
        ));

        pool.set_relayer(&owner, relayer).unwrap();
        let payout = pool.withdraw_relay(&relayer, destination, 10, 0).unwrap();
        assert_eq!(payout.amount(), 10);
        assert_eq!(payout.destination, destination);
        assert_eq!(pool.balance(), 50);

        assert!(pool.withdraw_relay(&relayer, destination, 10, 0).unwrap_err().is_replay());
        assert_eq!(pool.balance(), 50);

        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_supply_insufficient_external_balance_restores_source() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(5);
        let err = pool.supply(addr(2), &mut wallet, 6).unwrap_err();
        assert_eq!(err, Error::InsufficientExternalBalance { requested: 6, held: 5 });
        assert_eq!(wallet.value(), 5);
        assert_eq!(pool.balance(), 0);
        cap.destroy();
    }

    #[test]
    fn test_supply_overflow_restores_source() {
        let (mut pool, cap) = new_pool();
        let mut big = Coin::from_external(u64::MAX);
        let proof = pool.supply(addr(2), &mut big, u64::MAX).unwrap();

        let mut wallet = Coin::from_external(10);
        let err = pool.supply(addr(2), &mut wallet, 1).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));
        assert_eq!(wallet.value(), 10);
        assert_eq!(pool.balance(), u64::MAX);

        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_supply_into_merges() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(100);
        let mut proof = pool.supply(addr(2), &mut wallet, 30).unwrap();
        pool.supply_into(addr(2), &mut proof, &mut wallet, 20).unwrap();
        assert_eq!(proof.amount(), 50);
        assert_eq!(pool.balance(), 50);
        assert_eq!(wallet.value(), 50);
        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_repay_mints_no_claim() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(70);
        pool.repay(addr(5), &mut wallet, 70).unwrap();
        assert_eq!(pool.balance(), 70);
        assert_eq!(wallet.value(), 0);

        let events = pool.drain_events();
        assert!(matches!(events.last().unwrap().kind, PoolEventKind::Repaid { amount: 70, .. }));
        cap.destroy();
    }

    #[test]
    fn test_withdraw_local_insufficient_claim() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(10);
        let mut proof = pool.supply(addr(2), &mut wallet, 10).unwrap();
        let err = pool.withdraw_local(addr(2), &mut proof, 11).unwrap_err();
        assert_eq!(err, Error::InsufficientClaim { requested: 11, held: 10 });
        assert_eq!(pool.balance(), 10);
        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_withdraw_local_insufficient_balance_keeps_proof() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(10);
        let mut proof = pool.supply(addr(2), &mut wallet, 10).unwrap();
        let drained = pool.withdraw_root(&cap, addr(8), 8).unwrap();
        assert_eq!(drained.amount(), 8);

        let err = pool.withdraw_local(addr(2), &mut proof, 5).unwrap_err();
        assert_eq!(err, Error::InsufficientBalance { requested: 5, available: 2 });
        assert_eq!(proof.amount(), 10);
        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_withdraw_local_rejects_foreign_proof() {
        let (mut pool_a, cap_a) = new_pool();
        let (mut pool_b, cap_b) = Pool::<Usdc>::create(PoolId::from_bytes([7u8; 32]), addr(1), None);
        let mut wallet = Coin::from_external(20);
        let mut proof_b = pool_b.supply(addr(2), &mut wallet, 20).unwrap();
        let mut seed = Coin::from_external(20);
        let proof_a = pool_a.supply(addr(2), &mut seed, 20).unwrap();

        assert!(matches!(
            pool_a.withdraw_local(addr(2), &mut proof_b, 1),
            Err(Error::PoolMismatch { .. })
        ));
        assert_eq!(pool_a.balance(), 20);

        let _ = proof_a.destroy();
        let _ = proof_b.destroy();
        cap_a.destroy();
        cap_b.destroy();
    }

    #[test]
    fn test_relay_failure_on_balance_keeps_nonce() {
        let (mut pool, cap) = new_pool();
        let relayer = addr(3);
        pool.set_relayer(&addr(1), relayer).unwrap();

        let err = pool.withdraw_relay(&relayer, addr(4), 10, 3).unwrap_err();
        assert_eq!(err, Error::InsufficientBalance { requested: 10, available: 0 });
        assert_eq!(pool.lanes().lane(Lane::Withdraw).watermark(), 0);

        let mut wallet = Coin::from_external(10);
        pool.repay(addr(5), &mut wallet, 10).unwrap();
        let _ = pool.withdraw_relay(&relayer, addr(4), 10, 3).unwrap();
        assert_eq!(pool.lanes().lane(Lane::Withdraw).watermark(), 4);
        cap.destroy();
    }

    #[test]
    fn test_borrow_lane_is_separate() {
        let (mut pool, cap) = new_pool();
        let relayer = addr(3);
        pool.set_relayer(&addr(1), relayer).unwrap();
        let mut wallet = Coin::from_external(100);
        pool.repay(addr(5), &mut wallet, 100).unwrap();

        let _ = pool.withdraw_relay(&relayer, addr(4), 10, 0).unwrap();
        let payout = pool.borrow_relay(&relayer, addr(4), 10, 0).unwrap();
        assert_eq!(payout.amount(), 10);
        assert!(pool.borrow_relay(&relayer, addr(4), 10, 0).unwrap_err().is_replay());
        assert_eq!(pool.balance(), 80);
        cap.destroy();
    }

    #[test]
    fn test_set_relayer_requires_owner() {
        let (mut pool, cap) = new_pool();
        let err = pool.set_relayer(&addr(2), addr(3)).unwrap_err();
        assert!(matches!(err, Error::NotOwner(_)));
        assert_eq!(pool.relayer(), None);
        cap.destroy();
    }

    #[test]
    fn test_withdraw_root_with_foreign_capability() {
        let (mut pool, cap) = new_pool();
        let (_other, other_cap) = Pool::<Usdc>::create(PoolId::from_bytes([3u8; 32]), addr(1), None);
        assert!(matches!(
            pool.withdraw_root(&other_cap, addr(2), 0),
            Err(Error::PoolMismatch { .. })
        ));
        cap.destroy();
        other_cap.destroy();
    }

    #[test]
    fn test_remote_withdraw_escrows_claim() {
        let (mut pool, cap) = new_pool();
        let mut wallet = Coin::from_external(50);
        let mut proof = pool.supply(addr(2), &mut wallet, 50).unwrap();

        let first = pool.request_remote_withdraw(addr(2), &mut proof, 21, addr(6), 20).unwrap();
        let second = pool.request_remote_borrow(addr(2), 21, addr(6), 5).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(proof.amount(), 30);
        assert_eq!(pool.balance(), 50);

        assert!(matches!(
            pool.request_remote_withdraw(addr(2), &mut proof, 21, addr(6), 31),
            Err(Error::InsufficientClaim { .. })
        ));
        assert_eq!(pool.snapshot().outbound_sequence, 2);

        let _ = proof.destroy();
        cap.destroy();
    }

    #[test]
    fn test_snapshot_restore() {
        let (mut pool, cap) = new_pool();
        let relayer = addr(3);
        pool.set_relayer(&addr(1), relayer).unwrap();
        let mut wallet = Coin::from_external(30);
        pool.repay(addr(5), &mut wallet, 30).unwrap();
        let _ = pool.withdraw_relay(&relayer, addr(4), 5, 2).unwrap();

        let snapshot = pool.snapshot();
        let mut restored = Pool::<Usdc>::restore(snapshot, None).unwrap();
        assert_eq!(restored.balance(), 25);
        assert_eq!(restored.relayer(), Some(relayer));
        assert!(restored.withdraw_relay(&relayer, addr(4), 5, 2).unwrap_err().is_replay());
        let _ = restored.withdraw_relay(&relayer, addr(4), 5, 0).unwrap();

        let _ = pool.withdraw_root(&cap, addr(1), 0).unwrap();
        cap.destroy();
    }

    #[test]
    fn test_restore_rejects_other_value_type() {
        struct Dai;
        impl ValueType for Dai {
            const SYMBOL: &'static str = "DAI";
        }

        let (pool, cap) = new_pool();
        let err = Pool::<Dai>::restore(pool.snapshot(), None).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        cap.destroy();
    }

    #[test]
    fn test_events_only_for_commits() {
        let (mut pool, cap) = new_pool();
        assert_eq!(pool.drain_events().len(), 1);

        let _ = pool.withdraw_relay(&addr(3), addr(4), 1, 0);
        let _ = pool.set_relayer(&addr(9), addr(3));
        assert!(pool.drain_events().is_empty());
        cap.destroy();
    }
}
