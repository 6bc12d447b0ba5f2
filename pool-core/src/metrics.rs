//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring pools.
//!
//! # Metrics
//!
//! - `pool_operations_total{operation}` - Committed operations
//! - `pool_rejections_total{reason}` - Rejected operations by error reason
//! - `pool_pending_gaps{pool,lane}` - Pending nonce gaps
//! - `pool_pools_total` - Pools managed by the registry

use crate::types::{Lane, PoolId};
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed operations by kind
    pub operations_total: IntCounterVec,

    /// Rejected operations by reason
    pub rejections_total: IntCounterVec,

    /// Pending nonce gaps by lane
    pub pending_gaps: IntGaugeVec,

    /// Pools under management
    pub pools_total: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("pool_operations_total", "Committed pool operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("pool_rejections_total", "Rejected pool operations"),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let pending_gaps = IntGaugeVec::new(
            Opts::new("pool_pending_gaps", "Pending nonce gaps"),
            &["pool", "lane"],
        )?;
        registry.register(Box::new(pending_gaps.clone()))?;

        let pools_total = IntGauge::new("pool_pools_total", "Pools under management")?;
        registry.register(Box::new(pools_total.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            pending_gaps,
            pools_total,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_operation(&self, operation: &str) {
        self.operations_total.with_label_values(&[operation]).inc();
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, error: &crate::Error) {
        self.rejections_total.with_label_values(&[error.reason()]).inc();
    }

    /// Update the pending gap gauge for a pool lane
    pub fn set_pending_gaps(&self, pool: PoolId, lane: Lane, pending: u64) {
        self.pending_gaps
            .with_label_values(&[&pool.to_string(), lane.as_str()])
            .set(i64::try_from(pending).unwrap_or(i64::MAX));
    }

    /// Record a pool joining the registry
    pub fn record_pool_added(&self) {
        self.pools_total.inc();
    }

    /// Record a pool leaving the registry
    pub fn record_pool_removed(&self) {
        self.pools_total.dec();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
