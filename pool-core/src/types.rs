//! Core types for pool custody
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (unsigned integer amounts, checked)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Relay instruction sequence number
pub type Nonce = u64;

/// Account address (32 bytes, derived from an Ed25519 key or assigned)
///
/// Serializes as a `0x` hex string in human-readable formats (JSON, TOML)
/// and as raw bytes otherwise (bincode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero address
    pub const ZERO: Address = Address([0u8; 32]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive from an Ed25519 public key (SHA-256 of the key bytes)
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public_key);
        Self(hasher.finalize().into())
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = crate::Error;

    /// Parse `0x`-prefixed or bare hex; short forms are left-padded with zeros
    fn from_str(s: &str) -> crate::Result<Self> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        if hex.is_empty() || hex.len() > 64 {
            return Err(crate::Error::Serialization(format!("Invalid address: {}", s)));
        }

        let padded = format!("{:0>64}", hex);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| crate::Error::Serialization(format!("Invalid address {}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Stable pool identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(Address);

impl PoolId {
    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Address::from_bytes(bytes))
    }

    /// Underlying address
    pub fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for PoolId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PoolId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Address::from_str(s).map(Self)
    }
}

/// Fungible value type tag
///
/// Pools, coins, proofs and capabilities are generic over a tag so that
/// value of one type can never be credited to, or claimed from, a pool of
/// another.
pub trait ValueType: Send + Sync + 'static {
    /// Ticker-style symbol used in logs and snapshots
    const SYMBOL: &'static str;
}

/// Relay instruction lane; each lane has its own nonce space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Cross-domain withdraw settlement
    Withdraw,
    /// Cross-domain borrow settlement
    Borrow,
}

impl Lane {
    /// Lane name
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Withdraw => "withdraw",
            Lane::Borrow => "borrow",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
