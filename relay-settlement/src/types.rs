//! Core types for relay settlement

use chrono::{DateTime, Utc};
use hex::FromHex;
use pool_core::{Address, KeyPair, Lane, Nonce, PoolId, Signature};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Domain separator prepended to every signed instruction
const SIGNING_DOMAIN: &[u8] = b"omnipool/relay-instruction/v1";

/// Cross-domain instruction the relay delivers to a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInstruction {
    /// Withdraw or borrow lane
    pub lane: Lane,

    /// Target pool
    pub pool: PoolId,

    /// Recipient of the payout
    pub destination: Address,

    /// Amount to pay out
    pub amount: u64,

    /// Per-lane sequence number assigned by the source domain
    pub nonce: Nonce,
}

impl RelayInstruction {
    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut bytes = SIGNING_DOMAIN.to_vec();
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }

    /// Reject instructions that could never move value
    pub fn validate(&self) -> crate::Result<()> {
        if self.amount == 0 {
            return Err(crate::Error::InvalidInstruction(format!(
                "zero {} amount for pool {} nonce {}",
                self.lane.as_str(),
                self.pool,
                self.nonce
            )));
        }
        Ok(())
    }

    /// Sign with `keypair`
    pub fn sign(self, keypair: &KeyPair) -> crate::Result<SignedInstruction> {
        let signature = keypair.sign(&self.signing_bytes()?);
        Ok(SignedInstruction {
            instruction: self,
            public_key: PublicKey(keypair.public_key()),
            signature,
        })
    }
}

/// Ed25519 verifying key, hex in human-readable formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; 32]);

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            <[u8; 32]>::from_hex(encoded.strip_prefix("0x").unwrap_or(&encoded))
                .map(Self)
                .map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Relay instruction with the relayer's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInstruction {
    /// Signed instruction
    pub instruction: RelayInstruction,

    /// Signer's verifying key
    pub public_key: PublicKey,

    /// Signature over [`RelayInstruction::signing_bytes`]
    pub signature: Signature,
}

impl SignedInstruction {
    /// Verify the signature and return the signer's address
    pub fn verify(&self) -> crate::Result<Address> {
        let message = self.instruction.signing_bytes()?;
        pool_core::crypto::verify_signature(&message, &self.signature, &self.public_key.0)
            .map_err(|e| crate::Error::Signature(e.to_string()))
    }
}

/// Result of settling one instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Payout delivered
    Applied {
        /// Recipient
        destination: Address,
        /// Amount paid
        amount: u64,
    },

    /// Nonce was already settled (or never announced); nothing moved
    AlreadySettled,

    /// Precondition failed; nothing moved
    Rejected {
        /// Stable error code
        code: u16,
        /// Short error label
        reason: String,
        /// Human-readable detail
        message: String,
    },
}

impl SettlementOutcome {
    /// Rejection describing `error`
    pub fn rejected(error: &crate::Error) -> Self {
        SettlementOutcome::Rejected {
            code: error.code(),
            reason: error.reason().to_string(),
            message: error.to_string(),
        }
    }

    /// Whether value moved
    pub fn is_applied(&self) -> bool {
        matches!(self, SettlementOutcome::Applied { .. })
    }
}

/// Outcome of one instruction in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Position in the submitted batch
    pub index: usize,

    /// Target pool
    pub pool: PoolId,

    /// Instruction lane
    pub lane: Lane,

    /// Instruction nonce
    pub nonce: Nonce,

    /// What happened
    pub outcome: SettlementOutcome,
}

/// Summary of a settled batch, records in submission order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Per-instruction records
    pub records: Vec<SettlementRecord>,

    /// Instructions that moved value
    pub applied: usize,

    /// Instructions ignored as already settled
    pub already_settled: usize,

    /// Instructions rejected
    pub rejected: usize,

    /// Total amount paid out
    pub total_paid: u128,

    /// Pools touched
    pub pool_count: usize,

    /// Batch start
    pub started_at: DateTime<Utc>,

    /// Batch end
    pub finished_at: DateTime<Utc>,
}

impl SettlementReport {
    /// Tally `records`, which must already be in submission order
    pub fn from_records(records: Vec<SettlementRecord>, pool_count: usize, started_at: DateTime<Utc>) -> Self {
        let mut report = Self {
            records: Vec::new(),
            applied: 0,
            already_settled: 0,
            rejected: 0,
            total_paid: 0,
            pool_count,
            started_at,
            finished_at: Utc::now(),
        };

        for record in &records {
            match &record.outcome {
                SettlementOutcome::Applied { amount, .. } => {
                    report.applied += 1;
                    report.total_paid += u128::from(*amount);
                }
                SettlementOutcome::AlreadySettled => report.already_settled += 1,
                SettlementOutcome::Rejected { .. } => report.rejected += 1,
            }
        }
        report.records = records;
        report
    }
}
