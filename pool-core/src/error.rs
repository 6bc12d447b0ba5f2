//! Error types for pool custody

use crate::types::{Nonce, PoolId};
use std::fmt;
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pool errors
///
/// Every variant carries a distinct, stable [`Error::code`]. Domain variants
/// are precondition violations: the attempted operation changed nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Pool ledger holds less than requested
    #[error("Insufficient pool balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount asked for
        requested: u64,
        /// Ledger balance at the time of the request
        available: u64,
    },

    /// Withdraw proof covers less than requested
    #[error("Insufficient claim: requested {requested}, proof holds {held}")]
    InsufficientClaim {
        /// Amount asked for
        requested: u64,
        /// Amount carried by the proof
        held: u64,
    },

    /// Caller's external coin holds less than requested
    #[error("Insufficient external balance: requested {requested}, held {held}")]
    InsufficientExternalBalance {
        /// Amount asked for
        requested: u64,
        /// Value of the coin offered
        held: u64,
    },

    /// Capability or proof is bound to a different pool
    #[error("Pool mismatch: expected {expected}, got {actual}")]
    PoolMismatch {
        /// Pool the operation targets
        expected: PoolId,
        /// Pool the object is bound to
        actual: PoolId,
    },

    /// Zero-destroy of a proof that still carries value
    #[error("Cannot destroy proof for pool {pool} carrying {amount}")]
    NonZeroDestruction {
        /// Pool the proof is bound to
        pool: PoolId,
        /// Outstanding amount
        amount: u64,
    },

    /// Zero-destroy of a coin that still carries value
    #[error("Cannot destroy {value_type} coin carrying {value}")]
    NonZeroCoin {
        /// Value type symbol
        value_type: &'static str,
        /// Remaining value
        value: u64,
    },

    /// Caller is not the authorized relayer
    #[error("Caller {0} is not the authorized relayer")]
    NotRelayer(String),

    /// Caller is not the pool owner
    #[error("Caller {0} is not the pool owner")]
    NotOwner(String),

    /// Nonce already settled, or never announced as a gap
    #[error("Duplicate or unknown {lane} nonce {nonce}")]
    DuplicateOrUnknownNonce {
        /// Instruction lane
        lane: &'static str,
        /// Offending nonce
        nonce: Nonce,
    },

    /// Watermark cannot advance past the nonce space
    #[error("{lane} nonce space exhausted")]
    NonceExhausted {
        /// Instruction lane
        lane: &'static str,
    },

    /// Frontier jump would exceed the configured gap bound
    #[error("{lane} nonce {nonce} would open {requested} gaps (limit {limit})")]
    GapLimitExceeded {
        /// Instruction lane
        lane: &'static str,
        /// Offending nonce
        nonce: Nonce,
        /// Gap count after the jump
        requested: u64,
        /// Configured maximum
        limit: u64,
    },

    /// Signature or key failed verification
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Pool already exists for this value type
    #[error("Pool already exists: {0}")]
    AlreadyExists(String),

    /// Pool or stored object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Amount arithmetic would overflow
    #[error("Amount overflow: {0}")]
    Overflow(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persisted snapshot failed its integrity check
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

impl Error {
    /// Stable numeric discriminator, unique per failure cause
    pub fn code(&self) -> u16 {
        match self {
            Error::InsufficientBalance { .. } => 1,
            Error::InsufficientClaim { .. } => 2,
            Error::InsufficientExternalBalance { .. } => 3,
            Error::PoolMismatch { .. } => 4,
            Error::NonZeroDestruction { .. } => 5,
            Error::NotRelayer(_) => 6,
            Error::NotOwner(_) => 7,
            Error::DuplicateOrUnknownNonce { .. } => 8,
            Error::NonceExhausted { .. } => 9,
            Error::GapLimitExceeded { .. } => 10,
            Error::AlreadyExists(_) => 11,
            Error::NotFound(_) => 12,
            Error::Overflow(_) => 13,
            Error::InvalidSignature(_) => 14,
            Error::NonZeroCoin { .. } => 15,
            Error::Concurrency(_) => 100,
            Error::Config(_) => 101,
            Error::Io(_) => 102,
            Error::Serialization(_) => 103,
            Error::Corrupt(_) => 104,
        }
    }

    /// Short label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InsufficientClaim { .. } => "insufficient_claim",
            Error::InsufficientExternalBalance { .. } => "insufficient_external_balance",
            Error::PoolMismatch { .. } => "pool_mismatch",
            Error::NonZeroDestruction { .. } => "non_zero_destruction",
            Error::NotRelayer(_) => "not_relayer",
            Error::NotOwner(_) => "not_owner",
            Error::DuplicateOrUnknownNonce { .. } => "duplicate_or_unknown_nonce",
            Error::NonceExhausted { .. } => "nonce_exhausted",
            Error::GapLimitExceeded { .. } => "gap_limit_exceeded",
            Error::AlreadyExists(_) => "already_exists",
            Error::NotFound(_) => "not_found",
            Error::Overflow(_) => "overflow",
            Error::InvalidSignature(_) => "invalid_signature",
            Error::NonZeroCoin { .. } => "non_zero_coin",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Corrupt(_) => "corrupt",
        }
    }

    /// A replayed relay instruction; the relay may ignore it
    pub fn is_replay(&self) -> bool {
        matches!(self, Error::DuplicateOrUnknownNonce { .. })
    }

    /// Transient infrastructure failure worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Concurrency(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// An operation that takes ownership failed; the value is handed back
///
/// Converts into [`Error`] with `?`, dropping the returned value.
pub struct Refused<T> {
    /// Why the operation was refused
    pub error: Error,
    /// The value the caller passed in, untouched
    pub returned: T,
}

impl<T> Refused<T> {
    /// Pair an error with the value being returned
    pub fn new(error: Error, returned: T) -> Self {
        Self { error, returned }
    }

    /// Split into the error and the returned value
    pub fn into_parts(self) -> (Error, T) {
        (self.error, self.returned)
    }
}

impl<T> fmt::Debug for Refused<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refused").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<T> From<Refused<T>> for Error {
    fn from(refused: Refused<T>) -> Self {
        refused.error
    }
}
