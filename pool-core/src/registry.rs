//! Registry of live pools for one value type
//!
//! Maps each [`PoolId`] to the handle of the actor that owns it. Pools are
//! created or restored through the registry so every pool shares the
//! registry's event channel and metrics.

use crate::{
    actor::{spawn_pool_actor, PoolHandle},
    capability::RootCapability,
    events::PoolEvent,
    metrics::Metrics,
    pool::{Pool, PoolSnapshot},
    storage::SnapshotStore,
    store::{CapabilityStore, ProofStore},
    types::{Address, PoolId, ValueType},
    Config, Error, Result,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Live pools of value type `V`
pub struct PoolRegistry<V: ValueType> {
    pools: Arc<DashMap<PoolId, PoolHandle<V>>>,
    events: broadcast::Sender<PoolEvent>,
    metrics: Metrics,
    mailbox_capacity: usize,
    max_pending_gaps: Option<u64>,
}

impl<V: ValueType> PoolRegistry<V> {
    /// Create an empty registry
    pub fn new(config: &Config) -> Self {
        Self::with_metrics(config, Metrics::default())
    }

    /// Create an empty registry reporting into `metrics`
    pub fn with_metrics(config: &Config, metrics: Metrics) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            pools: Arc::new(DashMap::new()),
            events,
            metrics,
            mailbox_capacity: config.mailbox_capacity,
            max_pending_gaps: config.nonce.max_pending_gaps,
        }
    }

    /// Create pool `id` owned by `owner`
    ///
    /// Returns the pool's handle and its only root capability.
    pub fn create_pool(&self, owner: Address, id: PoolId) -> Result<(PoolHandle<V>, RootCapability<V>)> {
        match self.pools.entry(id) {
            Entry::Occupied(_) => Err(Error::AlreadyExists(format!("{} pool {}", V::SYMBOL, id))),
            Entry::Vacant(slot) => {
                let (pool, capability) = Pool::create(id, owner, self.max_pending_gaps);
                let handle = self.spawn(pool);
                slot.insert(handle.clone());
                Ok((handle, capability))
            }
        }
    }

    /// Bring a persisted pool back to life
    ///
    /// The root capability and stored claims recorded in the snapshot are
    /// placed back into `capabilities` and `proofs`. Refuses with
    /// `AlreadyExists` if the pool is live or either store already holds
    /// tokens for it.
    pub fn restore_pool(
        &self,
        snapshot: PoolSnapshot,
        capabilities: &CapabilityStore<V>,
        proofs: &ProofStore<V>,
    ) -> Result<PoolHandle<V>> {
        let id = snapshot.pool;
        if capabilities.holders(id) > 0 || proofs.holders(id) > 0 {
            return Err(Error::AlreadyExists(format!("tokens for {} pool {}", V::SYMBOL, id)));
        }
        let capability_holder = snapshot.capability_holder;
        let claims = snapshot.claims.clone();

        let handle = match self.pools.entry(id) {
            Entry::Occupied(_) => return Err(Error::AlreadyExists(format!("{} pool {}", V::SYMBOL, id))),
            Entry::Vacant(slot) => {
                let pool = Pool::restore(snapshot, self.max_pending_gaps)?;

                tracing::info!(
                    pool = %pool.id(),
                    balance = pool.balance(),
                    claims = claims.len(),
                    "Pool restored"
                );

                let handle = self.spawn(pool);
                slot.insert(handle.clone());
                handle
            }
        };

        if let Some(holder) = capability_holder {
            capabilities.reinstate(holder, id)?;
        }
        proofs.reinstate(id, &claims)?;
        Ok(handle)
    }

    fn spawn(&self, pool: Pool<V>) -> PoolHandle<V> {
        self.metrics.record_pool_added();
        spawn_pool_actor(pool, self.mailbox_capacity, self.events.clone(), self.metrics.clone())
    }

    /// Handle for pool `id`
    pub fn pool(&self, id: PoolId) -> Result<PoolHandle<V>> {
        self.pools
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("{} pool {}", V::SYMBOL, id)))
    }

    /// Whether pool `id` is registered
    pub fn contains(&self, id: PoolId) -> bool {
        self.pools.contains_key(&id)
    }

    /// Registered pool ids
    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.pools.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pools are registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Snapshot every pool
    pub async fn snapshot_all(&self) -> Result<Vec<PoolSnapshot>> {
        let handles: Vec<PoolHandle<V>> = self.pools.iter().map(|entry| entry.value().clone()).collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.snapshot().await?);
        }
        snapshots.sort_by_key(|snapshot| snapshot.pool);
        Ok(snapshots)
    }

    /// Snapshot every pool into `store`
    ///
    /// Each snapshot records where the pool's capability and claims are held
    /// in `capabilities` and `proofs`.
    pub async fn save_all(
        &self,
        store: &SnapshotStore,
        capabilities: &CapabilityStore<V>,
        proofs: &ProofStore<V>,
    ) -> Result<usize> {
        let mut snapshots = self.snapshot_all().await?;
        for snapshot in &mut snapshots {
            snapshot.capability_holder = capabilities.holder_of(snapshot.pool);
            snapshot.claims = proofs.claims_for(snapshot.pool);
            store.save(snapshot)?;
        }

        tracing::info!(pools = snapshots.len(), value_type = V::SYMBOL, "Pools saved");

        Ok(snapshots.len())
    }

    /// Restore every pool of this value type found in `store`
    ///
    /// Snapshots of other value types are skipped.
    pub fn restore_all(
        &self,
        store: &SnapshotStore,
        capabilities: &CapabilityStore<V>,
        proofs: &ProofStore<V>,
    ) -> Result<usize> {
        let mut restored = 0;
        for snapshot in store.load_all()? {
            if snapshot.value_type != V::SYMBOL {
                tracing::debug!(pool = %snapshot.pool, value_type = %snapshot.value_type, "Skipping snapshot");
                continue;
            }
            self.restore_pool(snapshot, capabilities, proofs)?;
            restored += 1;
        }
        Ok(restored)
    }

    /// Subscribe to committed events of every pool
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Metrics shared by every pool
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop every pool actor and empty the registry
    pub async fn shutdown(&self) -> Result<()> {
        for id in self.pool_ids() {
            let Some((_, handle)) = self.pools.remove(&id) else {
                continue;
            };
            self.metrics.record_pool_removed();
            if let Err(e) = handle.shutdown().await {
                tracing::warn!(pool = %handle.pool_id(), error = %e, "Pool actor already stopped");
            }
        }
        Ok(())
    }
}

impl<V: ValueType> fmt::Debug for PoolRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("value_type", &V::SYMBOL)
            .field("pools", &self.pools.len())
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("max_pending_gaps", &self.max_pending_gaps)
            .finish()
    }
}
