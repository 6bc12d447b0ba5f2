//! Relay Settlement
//!
//! Delivers signed cross-domain relay instructions to custody pools.
//!
//! # Architecture
//!
//! A relay observes withdraw and borrow requests on a remote domain and
//! forwards each one as a [`SignedInstruction`]. The [`RelaySettler`]:
//!
//! 1. **Verifies** the Ed25519 signature and derives the caller address
//! 2. **Routes** the instruction to the pool actor in the [`PoolRegistry`]
//! 3. **Settles** it through the pool's relayer gate and nonce reconciler
//! 4. **Delivers** the released coin to a [`PayoutSink`]
//!
//! Instructions may arrive out of order and more than once. A replayed nonce
//! is reported as [`SettlementOutcome::AlreadySettled`] and moves nothing.
//!
//! # Example
//!
//! ```no_run
//! use relay_settlement::{Config, ExternalBalances, RelaySettler};
//! use pool_core::{PoolRegistry, ValueType};
//! use std::sync::Arc;
//!
//! struct Usdc;
//! impl ValueType for Usdc {
//!     const SYMBOL: &'static str = "USDC";
//! }
//!
//! #[tokio::main]
//! async fn main() -> relay_settlement::Result<()> {
//!     let config = Config::default();
//!     let registry = Arc::new(PoolRegistry::<Usdc>::new(&config.pool));
//!     let payouts = Arc::new(ExternalBalances::<Usdc>::new());
//!     let settler = RelaySettler::from_config(registry, payouts, &config);
//!
//!     let report = settler.settle_batch(Vec::new()).await?;
//!     println!("Applied {} instructions", report.applied);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod payout;
pub mod settler;
pub mod error;
pub mod config;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    PublicKey, RelayInstruction, SettlementOutcome, SettlementRecord, SettlementReport,
    SignedInstruction,
};
pub use payout::{deliver_or_return, ExternalBalances, PayoutSink};
pub use settler::RelaySettler;
pub use config::{Config, RetryConfig};

pub use pool_core::PoolRegistry;
