//! Omnipool Core
//!
//! Pooled custody of one fungible value type with capability-gated outflows
//! and replay-safe relay settlement.
//!
//! # Architecture
//!
//! - **Ledger**: Per-pool balance, credited by supplies and repayments
//! - **Root Capability**: Unforgeable, non-copyable authority over one pool
//! - **Withdraw Proof**: Owned, splittable claim on supplied value
//! - **Nonce Reconciler**: Out-of-order, at-most-once relay settlement
//! - **Single Writer**: One actor per pool serializes its mutations
//!
//! # Invariants
//!
//! - Value conservation: balance == Σ(inflows) − Σ(outflows)
//! - At-most-once: every relay nonce settles at most once per lane
//! - Atomicity: a failed operation changes nothing
//! - Exactly one root capability exists per pool

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod coin;
pub mod ledger;
pub mod capability;
pub mod proof;
pub mod nonce;
pub mod relayer;
pub mod events;
pub mod pool;
pub mod store;
pub mod actor;
pub mod registry;
pub mod storage;
pub mod crypto;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Refused, Result};
pub use types::{Address, Lane, Nonce, PoolId, ValueType};
pub use coin::Coin;
pub use ledger::Ledger;
pub use capability::RootCapability;
pub use proof::{Abandoned, WithdrawProof};
pub use nonce::{Acceptance, GapSet, NonceLanes, NonceReconciler};
pub use relayer::RelayerGate;
pub use events::{PoolEvent, PoolEventKind};
pub use pool::{ClaimRecord, Payout, Pool, PoolSnapshot, RemoteRequest};
pub use store::{CapabilityStore, ProofStore};
pub use actor::{spawn_pool_actor, PoolHandle};
pub use registry::PoolRegistry;
pub use storage::SnapshotStore;
pub use crypto::{KeyPair, Signature};
pub use config::Config;
pub use metrics::Metrics;
