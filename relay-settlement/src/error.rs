//! Error types for relay settlement

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Pool error
    #[error("Pool error: {0}")]
    Pool(#[from] pool_core::Error),

    /// Instruction signature did not verify
    #[error("Signature error: {0}")]
    Signature(String),

    /// Malformed instruction
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    /// Transient failures outlasted every retry
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last: pool_core::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable numeric discriminator; pool errors keep their own codes
    pub fn code(&self) -> u16 {
        match self {
            Error::Pool(e) => e.code(),
            Error::Signature(_) => 200,
            Error::InvalidInstruction(_) => 201,
            Error::RetriesExhausted { .. } => 202,
            Error::Config(_) => 203,
            Error::Serialization(_) => 204,
            Error::Io(_) => 205,
        }
    }

    /// Short label used in reports and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Pool(e) => e.reason(),
            Error::Signature(_) => "signature",
            Error::InvalidInstruction(_) => "invalid_instruction",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}

impl<T> From<pool_core::Refused<T>> for Error {
    fn from(refused: pool_core::Refused<T>) -> Self {
        Error::Pool(refused.error)
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
