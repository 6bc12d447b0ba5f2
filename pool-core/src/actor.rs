//! Actor-based concurrency for pools
//!
//! Each pool is owned by a single Tokio task:
//! - One writer per pool serializes every mutation of that pool
//! - Distinct pools run on independent tasks
//! - Bounded mailboxes give callers backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Relayers / depositors / owner              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               PoolHandle<V> (Clone)                   │
//! │   Checks proofs and capabilities the caller holds     │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              PoolActor<V> (Single Task)               │
//! │   Ledger, relayer gate and nonce lanes of one pool    │
//! │   Drained events → broadcast::Sender<PoolEvent>       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Capabilities never cross the mailbox: a handle checks the caller's
//! capability before sending. Value does cross it: coins travel with inflow
//! messages, and the part of a proof being redeemed is split off and travels
//! with the outflow message. A refused or undeliverable message hands back
//! whatever it carried. A dropped caller can lose what was in flight but can
//! never leave a claim behind that the ledger no longer backs.

use crate::{
    capability::RootCapability,
    coin::Coin,
    error::Refused,
    events::PoolEvent,
    metrics::Metrics,
    pool::{Payout, Pool, PoolSnapshot, RemoteRequest},
    proof::WithdrawProof,
    types::{Address, Lane, Nonce, PoolId, ValueType},
    Error, Result,
};
use std::fmt;
use tokio::sync::{broadcast, mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;
type CoinReply<T, V> = oneshot::Sender<std::result::Result<T, Refused<Coin<V>>>>;
type ClaimReply<T, V> = oneshot::Sender<std::result::Result<T, Refused<WithdrawProof<V>>>>;

/// Message sent to a pool actor
pub(crate) enum PoolMessage<V: ValueType> {
    /// Credit a coin and mint a proof
    Supply {
        depositor: Address,
        coin: Coin<V>,
        response: CoinReply<WithdrawProof<V>, V>,
    },

    /// Credit a coin without minting a claim
    Repay {
        payer: Address,
        coin: Coin<V>,
        response: CoinReply<(), V>,
    },

    /// Redeem a claim split off the holder's proof
    WithdrawLocal {
        holder: Address,
        claim: WithdrawProof<V>,
        response: ClaimReply<Coin<V>, V>,
    },

    /// Settle a relay instruction
    SettleRelay {
        lane: Lane,
        caller: Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
        response: Reply<Payout<V>>,
    },

    /// Debit for a capability the handle has already checked
    WithdrawRoot {
        destination: Address,
        amount: u64,
        response: Reply<Payout<V>>,
    },

    /// Replace the authorized relayer
    SetRelayer {
        caller: Address,
        relayer: Address,
        response: Reply<()>,
    },

    /// Escrow a claim split off the requester's proof for a remote withdraw
    RemoteWithdraw {
        requester: Address,
        claim: WithdrawProof<V>,
        destination_domain: u16,
        receiver: Address,
        response: ClaimReply<RemoteRequest, V>,
    },

    /// Record an outbound borrow request
    RemoteBorrow {
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
        response: Reply<RemoteRequest>,
    },

    /// Get ledger balance
    GetBalance { response: Reply<u64> },

    /// Get authorized relayer
    GetRelayer { response: Reply<Option<Address>> },

    /// Capture persistable state
    Snapshot { response: Reply<PoolSnapshot> },

    /// Shutdown actor
    Shutdown,
}

impl<V: ValueType> PoolMessage<V> {
    fn operation(&self) -> &'static str {
        match self {
            PoolMessage::Supply { .. } => "supply",
            PoolMessage::Repay { .. } => "repay",
            PoolMessage::WithdrawLocal { .. } => "withdraw_local",
            PoolMessage::SettleRelay { lane: Lane::Withdraw, .. } => "withdraw_relay",
            PoolMessage::SettleRelay { lane: Lane::Borrow, .. } => "borrow_relay",
            PoolMessage::WithdrawRoot { .. } => "withdraw_root",
            PoolMessage::SetRelayer { .. } => "set_relayer",
            PoolMessage::RemoteWithdraw { .. } => "request_remote_withdraw",
            PoolMessage::RemoteBorrow { .. } => "request_remote_borrow",
            PoolMessage::GetBalance { .. } => "get_balance",
            PoolMessage::GetRelayer { .. } => "get_relayer",
            PoolMessage::Snapshot { .. } => "snapshot",
            PoolMessage::Shutdown => "shutdown",
        }
    }

    /// Coin carried by an inflow message
    fn into_coin(self) -> Option<Coin<V>> {
        match self {
            PoolMessage::Supply { coin, .. } | PoolMessage::Repay { coin, .. } => Some(coin),
            _ => None,
        }
    }

    /// Claim carried by an outflow message
    fn into_claim(self) -> Option<WithdrawProof<V>> {
        match self {
            PoolMessage::WithdrawLocal { claim, .. } | PoolMessage::RemoteWithdraw { claim, .. } => Some(claim),
            _ => None,
        }
    }

    /// Whether the message mutates the pool
    fn is_command(&self) -> bool {
        !matches!(
            self,
            PoolMessage::GetBalance { .. }
                | PoolMessage::GetRelayer { .. }
                | PoolMessage::Snapshot { .. }
                | PoolMessage::Shutdown
        )
    }
}

/// Actor that owns one pool
pub struct PoolActor<V: ValueType> {
    /// Pool state
    pool: Pool<V>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<PoolMessage<V>>,

    /// Committed events are published here
    events: broadcast::Sender<PoolEvent>,

    /// Metrics collector
    metrics: Metrics,
}

impl<V: ValueType> PoolActor<V> {
    pub(crate) fn new(
        pool: Pool<V>,
        mailbox: mpsc::Receiver<PoolMessage<V>>,
        events: broadcast::Sender<PoolEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            pool,
            mailbox,
            events,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        // Events emitted while the pool was built outside the actor
        self.publish();

        while let Some(msg) = self.mailbox.recv().await {
            if let PoolMessage::Shutdown = msg {
                // Refuse new work, finish what is already queued
                self.mailbox.close();
                while let Ok(queued) = self.mailbox.try_recv() {
                    self.dispatch(queued);
                }
                break;
            }
            self.dispatch(msg);
        }

        tracing::info!(pool = %self.pool.id(), value_type = V::SYMBOL, "Pool actor stopped");
    }

    fn dispatch(&mut self, msg: PoolMessage<V>) {
        let operation = msg.operation();
        let is_command = msg.is_command();
        let outcome = self.handle_message(msg);

        if is_command {
            match outcome {
                Ok(()) => self.metrics.record_operation(operation),
                Err(e) => {
                    tracing::debug!(pool = %self.pool.id(), operation, error = %e, "Operation rejected");
                    self.metrics.record_rejection(&e);
                }
            }
        }

        self.publish();
    }

    /// Handle a single message, returning the operation's error for metrics
    fn handle_message(&mut self, msg: PoolMessage<V>) -> Result<()> {
        match msg {
            PoolMessage::Supply {
                depositor,
                coin,
                response,
            } => {
                let result = self.pool.supply_coin(depositor, coin);
                let outcome = result.as_ref().map(|_| ()).map_err(|r| r.error.clone());
                Self::reply(response, result);
                outcome
            }

            PoolMessage::Repay { payer, coin, response } => {
                let result = self.pool.repay_coin(payer, coin);
                let outcome = result.as_ref().map(|_| ()).map_err(|r| r.error.clone());
                Self::reply(response, result);
                outcome
            }

            PoolMessage::WithdrawLocal {
                holder,
                mut claim,
                response,
            } => {
                let amount = claim.amount();
                let result = match self.pool.withdraw_local(holder, &mut claim, amount) {
                    Ok(coin) => {
                        Self::retire(claim);
                        Ok(coin)
                    }
                    Err(error) => Err(Refused::new(error, claim)),
                };
                let outcome = result.as_ref().map(|_| ()).map_err(|r| r.error.clone());
                Self::reply(response, result);
                outcome
            }

            PoolMessage::SettleRelay {
                lane,
                caller,
                destination,
                amount,
                nonce,
                response,
            } => {
                let result = self.pool.settle_relay(lane, &caller, destination, amount, nonce);
                if let Err(e) = &result {
                    if !e.is_replay() {
                        tracing::warn!(
                            pool = %self.pool.id(),
                            lane = lane.as_str(),
                            nonce,
                            caller = %caller,
                            error = %e,
                            "Relay instruction rejected"
                        );
                    }
                }
                let reconciler = self.pool.lanes().lane(lane);
                self.metrics
                    .set_pending_gaps(self.pool.id(), lane, reconciler.pending_gaps().len());
                Self::reply_plain(response, result)
            }

            PoolMessage::WithdrawRoot {
                destination,
                amount,
                response,
            } => {
                let result = self.pool.debit_for_root(destination, amount);
                Self::reply_plain(response, result)
            }

            PoolMessage::SetRelayer {
                caller,
                relayer,
                response,
            } => {
                let result = self.pool.set_relayer(&caller, relayer);
                Self::reply_plain(response, result)
            }

            PoolMessage::RemoteWithdraw {
                requester,
                mut claim,
                destination_domain,
                receiver,
                response,
            } => {
                let amount = claim.amount();
                let result =
                    match self
                        .pool
                        .request_remote_withdraw(requester, &mut claim, destination_domain, receiver, amount)
                    {
                        Ok(request) => {
                            Self::retire(claim);
                            Ok(request)
                        }
                        Err(error) => Err(Refused::new(error, claim)),
                    };
                let outcome = result.as_ref().map(|_| ()).map_err(|r| r.error.clone());
                Self::reply(response, result);
                outcome
            }

            PoolMessage::RemoteBorrow {
                requester,
                destination_domain,
                receiver,
                amount,
                response,
            } => {
                let result = self
                    .pool
                    .request_remote_borrow(requester, destination_domain, receiver, amount);
                Self::reply_plain(response, result)
            }

            PoolMessage::GetBalance { response } => {
                let _ = response.send(Ok(self.pool.balance()));
                Ok(())
            }

            PoolMessage::GetRelayer { response } => {
                let _ = response.send(Ok(self.pool.relayer()));
                Ok(())
            }

            PoolMessage::Snapshot { response } => {
                let _ = response.send(Ok(self.pool.snapshot()));
                Ok(())
            }

            PoolMessage::Shutdown => {
                // Handled in main loop
                Ok(())
            }
        }
    }

    fn reply<T, R>(
        response: oneshot::Sender<std::result::Result<T, Refused<R>>>,
        result: std::result::Result<T, Refused<R>>,
    ) {
        if response.send(result).is_err() {
            tracing::error!("Pool caller went away before the reply; value carried by the reply is lost");
        }
    }

    /// Destroy a claim the pool has fully drawn down
    fn retire(claim: WithdrawProof<V>) {
        if let Err(refused) = claim.destroy_zero() {
            let (error, claim) = refused.into_parts();
            tracing::error!(error = %error, "Redeemed claim left with a remainder");
            let _ = claim.destroy();
        }
    }

    fn reply_plain<T>(response: Reply<T>, result: Result<T>) -> Result<()> {
        let outcome = result.as_ref().map(|_| ()).map_err(|e| e.clone());
        if response.send(result).is_err() {
            tracing::error!("Pool caller went away before the reply");
        }
        outcome
    }

    fn publish(&mut self) {
        for event in self.pool.drain_events() {
            // No subscribers is not an error
            let _ = self.events.send(event);
        }
    }
}

impl<V: ValueType> fmt::Debug for PoolActor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolActor")
            .field("pool", &self.pool)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Handle for sending messages to a pool actor
pub struct PoolHandle<V: ValueType> {
    pool: PoolId,
    sender: mpsc::Sender<PoolMessage<V>>,
}

impl<V: ValueType> Clone for PoolHandle<V> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            sender: self.sender.clone(),
        }
    }
}

impl<V: ValueType> fmt::Debug for PoolHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool", &self.pool)
            .field("value_type", &V::SYMBOL)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

fn mailbox_closed() -> Error {
    Error::Concurrency("Actor mailbox closed".to_string())
}

fn response_closed() -> Error {
    Error::Concurrency("Response channel closed".to_string())
}

impl<V: ValueType> PoolHandle<V> {
    /// Pool this handle addresses
    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> PoolMessage<V>) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await.map_err(|_| mailbox_closed())?;

        rx.await.map_err(|_| response_closed())?
    }

    /// Send a coin-carrying message
    ///
    /// An undeliverable message hands its coin back.
    async fn deliver<T>(
        &self,
        coin: Coin<V>,
        build: impl FnOnce(Coin<V>, CoinReply<T, V>) -> PoolMessage<V>,
    ) -> std::result::Result<T, Refused<Coin<V>>> {
        let (tx, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(msg)) = self.sender.send(build(coin, tx)).await {
            let coin = msg.into_coin().unwrap_or_else(Coin::zero);
            return Err(Refused::new(mailbox_closed(), coin));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(pool = %self.pool, "Pool actor dropped a coin-carrying request");
                Err(Refused::new(response_closed(), Coin::zero()))
            }
        }
    }

    /// Split `amount` off `proof` and send it with a claim-carrying message
    ///
    /// A refused or undeliverable claim is merged back into `proof`. Once the
    /// claim is split off, `proof` no longer covers it, so dropping this
    /// future can only shrink the outstanding claims.
    async fn redeem<T>(
        &self,
        proof: &mut WithdrawProof<V>,
        amount: u64,
        build: impl FnOnce(WithdrawProof<V>, ClaimReply<T, V>) -> PoolMessage<V>,
    ) -> Result<T> {
        proof.ensure_covers(self.pool, amount)?;
        let claim = proof.split(amount)?;

        let (tx, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(msg)) = self.sender.send(build(claim, tx)).await {
            if let Some(claim) = msg.into_claim() {
                Self::rejoin(proof, claim);
            }
            return Err(mailbox_closed());
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(refused)) => {
                let (error, claim) = refused.into_parts();
                Self::rejoin(proof, claim);
                Err(error)
            }
            Err(_) => {
                tracing::error!(pool = %self.pool, amount, "Pool actor dropped a claim-carrying request");
                Err(response_closed())
            }
        }
    }

    fn rejoin(proof: &mut WithdrawProof<V>, claim: WithdrawProof<V>) {
        if let Err(refused) = proof.merge(claim) {
            let (error, claim) = refused.into_parts();
            tracing::error!(error = %error, "Returned claim could not be merged back");
            let _ = claim.destroy();
        }
    }

    // Inflows

    /// Supply `amount` from `source` and mint a proof for it
    ///
    /// On failure `source` is left as it was.
    pub async fn supply(&self, depositor: Address, source: &mut Coin<V>, amount: u64) -> Result<WithdrawProof<V>> {
        let coin = source.split(amount)?;
        self.supply_coin(depositor, coin).await.map_err(|refused| {
            let (error, coin) = refused.into_parts();
            source.restore(coin);
            error
        })
    }

    /// Supply a whole coin and mint a proof for it
    pub async fn supply_coin(
        &self,
        depositor: Address,
        coin: Coin<V>,
    ) -> std::result::Result<WithdrawProof<V>, Refused<Coin<V>>> {
        self.deliver(coin, |coin, response| PoolMessage::Supply {
            depositor,
            coin,
            response,
        })
        .await
    }

    /// Supply `amount` from `source`, growing an existing proof
    pub async fn supply_into(
        &self,
        depositor: Address,
        proof: &mut WithdrawProof<V>,
        source: &mut Coin<V>,
        amount: u64,
    ) -> Result<()> {
        proof.ensure_covers(self.pool, 0)?;
        if proof.amount().checked_add(amount).is_none() {
            return Err(Error::Overflow(format!("proof {} + {}", proof.amount(), amount)));
        }

        let minted = self.supply(depositor, source, amount).await?;
        proof.merge(minted)?;
        Ok(())
    }

    /// Credit `amount` from `source` without minting a claim
    pub async fn repay(&self, payer: Address, source: &mut Coin<V>, amount: u64) -> Result<()> {
        let coin = source.split(amount)?;
        self.deliver(coin, |coin, response| PoolMessage::Repay { payer, coin, response })
            .await
            .map_err(|refused| {
                let (error, coin) = refused.into_parts();
                source.restore(coin);
                error
            })
    }

    // Outflows

    /// Redeem `amount` of `proof` locally
    pub async fn withdraw_local(
        &self,
        holder: Address,
        proof: &mut WithdrawProof<V>,
        amount: u64,
    ) -> Result<Coin<V>> {
        self.redeem(proof, amount, |claim, response| PoolMessage::WithdrawLocal {
            holder,
            claim,
            response,
        })
        .await
    }

    /// Settle a relayed withdraw
    pub async fn withdraw_relay(
        &self,
        caller: Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.settle_relay(Lane::Withdraw, caller, destination, amount, nonce).await
    }

    /// Settle a relayed borrow
    pub async fn borrow_relay(
        &self,
        caller: Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.settle_relay(Lane::Borrow, caller, destination, amount, nonce).await
    }

    /// Settle a relay instruction on `lane`
    pub async fn settle_relay(
        &self,
        lane: Lane,
        caller: Address,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    ) -> Result<Payout<V>> {
        self.request(|response| PoolMessage::SettleRelay {
            lane,
            caller,
            destination,
            amount,
            nonce,
            response,
        })
        .await
    }

    /// Withdraw with the root capability
    pub async fn withdraw_root(
        &self,
        capability: &RootCapability<V>,
        destination: Address,
        amount: u64,
    ) -> Result<Payout<V>> {
        capability.ensure_bound_to(self.pool)?;
        self.request(|response| PoolMessage::WithdrawRoot {
            destination,
            amount,
            response,
        })
        .await
    }

    // Administration

    /// Replace the authorized relayer; only the owner may call
    pub async fn set_relayer(&self, caller: Address, relayer: Address) -> Result<()> {
        self.request(|response| PoolMessage::SetRelayer {
            caller,
            relayer,
            response,
        })
        .await
    }

    // Outbound requests

    /// Record a cross-domain withdraw, escrowing `amount` of `proof`
    pub async fn request_remote_withdraw(
        &self,
        requester: Address,
        proof: &mut WithdrawProof<V>,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    ) -> Result<RemoteRequest> {
        self.redeem(proof, amount, |claim, response| PoolMessage::RemoteWithdraw {
            requester,
            claim,
            destination_domain,
            receiver,
            response,
        })
        .await
    }

    /// Record a cross-domain borrow request
    pub async fn request_remote_borrow(
        &self,
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    ) -> Result<RemoteRequest> {
        self.request(|response| PoolMessage::RemoteBorrow {
            requester,
            destination_domain,
            receiver,
            amount,
            response,
        })
        .await
    }

    // Queries

    /// Get ledger balance
    pub async fn balance(&self) -> Result<u64> {
        self.request(|response| PoolMessage::GetBalance { response }).await
    }

    /// Get authorized relayer
    pub async fn relayer(&self) -> Result<Option<Address>> {
        self.request(|response| PoolMessage::GetRelayer { response }).await
    }

    /// Capture persistable state
    pub async fn snapshot(&self) -> Result<PoolSnapshot> {
        self.request(|response| PoolMessage::Snapshot { response }).await
    }

    /// Shutdown actor
    ///
    /// Messages already queued are processed before the actor stops.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PoolMessage::Shutdown)
            .await
            .map_err(|_| mailbox_closed())?;
        Ok(())
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Spawn the actor for `pool`
pub fn spawn_pool_actor<V: ValueType>(
    pool: Pool<V>,
    mailbox_capacity: usize,
    events: broadcast::Sender<PoolEvent>,
    metrics: Metrics,
) -> PoolHandle<V> {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let id = pool.id();
    let actor = PoolActor::new(pool, rx, events, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    PoolHandle { pool: id, sender: tx }
}
