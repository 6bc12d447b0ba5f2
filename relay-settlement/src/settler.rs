//! Relay settler
//!
//! Verifies signed relay instructions and settles them against the pools of
//! a registry. Replays are reported as already settled so relays can retry
//! blindly; transient pool failures are retried with exponential backoff.

use crate::{
    config::{Config, RetryConfig},
    payout::{deliver_or_return, PayoutSink},
    types::{SettlementOutcome, SettlementRecord, SettlementReport, SignedInstruction},
    Error, Result,
};
use chrono::Utc;
use pool_core::{PoolId, PoolRegistry, ValueType};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Settles relay instructions for pools of value type `V`
pub struct RelaySettler<V: ValueType> {
    registry: Arc<PoolRegistry<V>>,
    sink: Arc<dyn PayoutSink<V>>,
    retry: RetryConfig,
    batch_concurrency: usize,
}

impl<V: ValueType> Clone for RelaySettler<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            retry: self.retry.clone(),
            batch_concurrency: self.batch_concurrency,
        }
    }
}

impl<V: ValueType> RelaySettler<V> {
    /// Create a settler over `registry`, delivering payouts to `sink`
    pub fn new(
        registry: Arc<PoolRegistry<V>>,
        sink: Arc<dyn PayoutSink<V>>,
        retry: RetryConfig,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            sink,
            retry,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Create a settler using the retry and batch settings of `config`
    pub fn from_config(registry: Arc<PoolRegistry<V>>, sink: Arc<dyn PayoutSink<V>>, config: &Config) -> Self {
        Self::new(registry, sink, config.retry.clone(), config.batch_concurrency)
    }

    /// Registry the settler draws pools from
    pub fn registry(&self) -> &Arc<PoolRegistry<V>> {
        &self.registry
    }

    /// Settle one signed instruction
    ///
    /// Domain failures come back as [`SettlementOutcome::Rejected`]. A bad
    /// signature, a zero amount, a refused payout or exhausted retries are
    /// errors.
    pub async fn settle(&self, signed: &SignedInstruction) -> Result<SettlementOutcome> {
        let caller = signed.verify()?;
        let instruction = &signed.instruction;
        instruction.validate()?;

        let mut attempt = 1;
        loop {
            let result = match self.registry.pool(instruction.pool) {
                Ok(pool) => {
                    pool.settle_relay(
                        instruction.lane,
                        caller,
                        instruction.destination,
                        instruction.amount,
                        instruction.nonce,
                    )
                    .await
                    .map(|payout| (pool, payout))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok((pool, payout)) => {
                    let outcome = SettlementOutcome::Applied {
                        destination: payout.destination,
                        amount: payout.amount(),
                    };
                    deliver_or_return(self.sink.as_ref(), &pool, payout).await?;

                    tracing::info!(
                        pool = %instruction.pool,
                        lane = instruction.lane.as_str(),
                        nonce = instruction.nonce,
                        amount = instruction.amount,
                        "Relay instruction applied"
                    );

                    return Ok(outcome);
                }
                Err(e) if e.is_replay() => {
                    tracing::debug!(
                        pool = %instruction.pool,
                        lane = instruction.lane.as_str(),
                        nonce = instruction.nonce,
                        "Relay instruction already settled"
                    );
                    return Ok(SettlementOutcome::AlreadySettled);
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(Error::RetriesExhausted { attempts: attempt, last: e });
                    }
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        pool = %instruction.pool,
                        nonce = instruction.nonce,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient settlement failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Ok(SettlementOutcome::rejected(&Error::Pool(e))),
            }
        }
    }

    /// Settle a batch
    ///
    /// Pools are settled concurrently; instructions for the same pool are
    /// applied in submission order. Records come back in submission order.
    pub async fn settle_batch(&self, batch: Vec<SignedInstruction>) -> Result<SettlementReport> {
        let started_at = Utc::now();
        let total = batch.len();

        let mut by_pool: BTreeMap<PoolId, Vec<(usize, SignedInstruction)>> = BTreeMap::new();
        for (index, signed) in batch.into_iter().enumerate() {
            by_pool.entry(signed.instruction.pool).or_default().push((index, signed));
        }
        let pool_count = by_pool.len();

        tracing::info!(instructions = total, pools = pool_count, "Settling batch");

        let permits = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut tasks = JoinSet::new();
        for (pool, instructions) in by_pool {
            let settler = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| pool_core::Error::Concurrency("Batch semaphore closed".to_string()))?;

                let mut records = Vec::with_capacity(instructions.len());
                for (index, signed) in instructions {
                    let outcome = match settler.settle(&signed).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::warn!(pool = %pool, index, error = %e, "Instruction failed");
                            SettlementOutcome::rejected(&e)
                        }
                    };
                    records.push(SettlementRecord {
                        index,
                        pool,
                        lane: signed.instruction.lane,
                        nonce: signed.instruction.nonce,
                        outcome,
                    });
                }
                Ok::<_, Error>(records)
            });
        }

        let mut records = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let pool_records = joined
                .map_err(|e| pool_core::Error::Concurrency(format!("Batch task failed: {}", e)))??;
            records.extend(pool_records);
        }
        records.sort_by_key(|record| record.index);

        let report = SettlementReport::from_records(records, pool_count, started_at);

        tracing::info!(
            applied = report.applied,
            already_settled = report.already_settled,
            rejected = report.rejected,
            "Batch settled"
        );

        Ok(report)
    }
}

impl<V: ValueType> fmt::Debug for RelaySettler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySettler")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::ExternalBalances;
    use crate::types::RelayInstruction;
    use pool_core::{Address, Coin, Config, KeyPair, Lane, RootCapability};

    struct Usdc;
    impl ValueType for Usdc {
        const SYMBOL: &'static str = "USDC";
    }

    fn pool_id(byte: u8) -> PoolId {
        PoolId::from_bytes([byte; 32])
    }

    struct Fixture {
        settler: RelaySettler<Usdc>,
        balances: Arc<ExternalBalances<Usdc>>,
        relayer: KeyPair,
        caps: Vec<RootCapability<Usdc>>,
    }

    async fn fixture(pools: &[u8], funding: u64) -> Fixture {
        let owner = Address::from_bytes([1u8; 32]);
        let relayer = KeyPair::from_seed(&[3u8; 32]);
        let registry = Arc::new(PoolRegistry::<Usdc>::new(&Config::default()));

        let mut caps = Vec::new();
        for byte in pools {
            let (pool, cap) = registry.create_pool(owner, pool_id(*byte)).unwrap();
            pool.set_relayer(owner, relayer.address()).await.unwrap();
            let mut wallet = Coin::from_external(funding);
            pool.repay(owner, &mut wallet, funding).await.unwrap();
            caps.push(cap);
        }

        let balances = Arc::new(ExternalBalances::new());
        let settler = RelaySettler::new(registry, balances.clone(), RetryConfig::default(), 4);
        Fixture {
            settler,
            balances,
            relayer,
            caps,
        }
    }

    impl Fixture {
        fn sign(&self, pool: u8, lane: Lane, amount: u64, nonce: u64) -> SignedInstruction {
            RelayInstruction {
                lane,
                pool: pool_id(pool),
                destination: Address::from_bytes([pool; 32]),
                amount,
                nonce,
            }
            .sign(&self.relayer)
            .unwrap()
        }

        async fn finish(self) {
            self.settler.registry().shutdown().await.unwrap();
            for cap in self.caps {
                cap.destroy();
            }
        }
    }

    #[tokio::test]
    async fn test_settle_and_replay() {
        let fx = fixture(&[7], 100).await;
        let signed = fx.sign(7, Lane::Withdraw, 10, 0);

        let outcome = fx.settler.settle(&signed).await.unwrap();
        assert!(outcome.is_applied());
        assert_eq!(fx.balances.balance_of(Address::from_bytes([7u8; 32])), 10);

        let again = fx.settler.settle(&signed).await.unwrap();
        assert_eq!(again, SettlementOutcome::AlreadySettled);
        assert_eq!(fx.balances.total(), 10);
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_bad_signature_is_error() {
        let fx = fixture(&[7], 100).await;
        let mut signed = fx.sign(7, Lane::Withdraw, 10, 0);
        signed.instruction.amount = 90;

        assert!(matches!(fx.settler.settle(&signed).await, Err(Error::Signature(_))));
        assert_eq!(fx.balances.total(), 0);
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_unauthorized_signer_rejected() {
        let fx = fixture(&[7], 100).await;
        let intruder = KeyPair::from_seed(&[9u8; 32]);
        let signed = RelayInstruction {
            lane: Lane::Borrow,
            pool: pool_id(7),
            destination: intruder.address(),
            amount: 10,
            nonce: 0,
        }
        .sign(&intruder)
        .unwrap();

        match fx.settler.settle(&signed).await.unwrap() {
            SettlementOutcome::Rejected { code, reason, .. } => {
                assert_eq!(code, 6);
                assert_eq!(reason, "not_relayer");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_unknown_pool_rejected() {
        let fx = fixture(&[7], 100).await;
        let outcome = fx.settler.settle(&fx.sign(8, Lane::Withdraw, 1, 0)).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::Rejected { code: 12, .. }));
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_zero_amount_is_invalid() {
        let fx = fixture(&[7], 100).await;
        let signed = fx.sign(7, Lane::Withdraw, 0, 0);
        assert!(matches!(
            fx.settler.settle(&signed).await,
            Err(Error::InvalidInstruction(_))
        ));

        let report = fx.settler.settle_batch(vec![signed]).await.unwrap();
        assert!(matches!(
            report.records[0].outcome,
            SettlementOutcome::Rejected { code: 201, .. }
        ));

        // Nonce 0 is still open
        assert!(fx.settler.settle(&fx.sign(7, Lane::Withdraw, 5, 0)).await.unwrap().is_applied());
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_refused_payout_credited_back() {
        use crate::payout::PayoutSink;
        use pool_core::Payout;

        let fx = fixture(&[7], 100).await;
        let destination = Address::from_bytes([7u8; 32]);
        fx.balances
            .deliver(Payout {
                destination,
                coin: Coin::from_external(u64::MAX),
            })
            .unwrap();

        let signed = fx.sign(7, Lane::Withdraw, 10, 0);
        let err = fx.settler.settle(&signed).await.unwrap_err();
        assert_eq!(err.reason(), "overflow");

        let pool = fx.settler.registry().pool(pool_id(7)).unwrap();
        assert_eq!(pool.balance().await.unwrap(), 100);
        assert_eq!(fx.balances.balance_of(destination), u64::MAX);
        assert_eq!(fx.settler.settle(&signed).await.unwrap(), SettlementOutcome::AlreadySettled);
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_stopped_pool_exhausts_retries() {
        let fx = fixture(&[7], 100).await;
        let pool = fx.settler.registry().pool(pool_id(7)).unwrap();
        pool.shutdown().await.unwrap();
        while !pool.is_closed() {
            tokio::task::yield_now().await;
        }

        let err = fx.settler.settle(&fx.sign(7, Lane::Withdraw, 1, 0)).await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        fx.finish().await;
    }

    #[tokio::test]
    async fn test_batch_preserves_order_per_pool() {
        let fx = fixture(&[1, 2, 3], 50).await;

        let mut batch = Vec::new();
        for nonce in [2u64, 0, 1, 0] {
            for pool in [1u8, 2, 3] {
                batch.push(fx.sign(pool, Lane::Withdraw, 10, nonce));
            }
        }
        // Exceeds what is left in pool 1 after three settlements
        batch.push(fx.sign(1, Lane::Borrow, 30, 0));

        let report = fx.settler.settle_batch(batch).await.unwrap();
        assert_eq!(report.records.len(), 13);
        assert_eq!(report.pool_count, 3);
        assert_eq!(report.applied, 9);
        assert_eq!(report.already_settled, 3);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.total_paid, 90);

        for (position, record) in report.records.iter().enumerate() {
            assert_eq!(record.index, position);
        }
        assert!(matches!(
            report.records[12].outcome,
            SettlementOutcome::Rejected { code: 1, .. }
        ));

        for pool in [1u8, 2, 3] {
            assert_eq!(fx.balances.balance_of(Address::from_bytes([pool; 32])), 30);
        }
        fx.finish().await;
    }
}
