//! Pool events for observability
//!
//! Each committed state change appends one event to the pool's outbox.
//! Events are emitted only after the operation succeeded; a rejected
//! operation leaves no trace here.

use crate::{
    nonce::Acceptance,
    types::{Address, Lane, Nonce, PoolId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Committed pool state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Pool the event belongs to
    pub pool: PoolId,

    /// Value type symbol
    pub value_type: String,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub kind: PoolEventKind,
}

impl PoolEvent {
    /// Stamp a new event
    pub fn new(pool: PoolId, value_type: &str, kind: PoolEventKind) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            pool,
            value_type: value_type.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEventKind {
    /// Pool created with zero balance
    PoolCreated {
        /// Owning authority
        owner: Address,
    },

    /// Depositor supplied value and received a claim
    Supplied {
        /// Depositor
        depositor: Address,
        /// Amount credited
        amount: u64,
    },

    /// Value credited without a claim
    Repaid {
        /// Payer
        payer: Address,
        /// Amount credited
        amount: u64,
    },

    /// Claim redeemed locally
    WithdrawnLocal {
        /// Proof holder
        holder: Address,
        /// Amount debited
        amount: u64,
    },

    /// Relay instruction settled
    RelaySettled {
        /// Instruction lane
        lane: Lane,
        /// Instruction nonce
        nonce: Nonce,
        /// Payout destination
        destination: Address,
        /// Amount debited
        amount: u64,
        /// How the nonce was reconciled
        acceptance: Acceptance,
    },

    /// Root capability holder withdrew
    RootWithdrawn {
        /// Payout destination
        destination: Address,
        /// Amount debited
        amount: u64,
    },

    /// Authorized relayer replaced
    RelayerChanged {
        /// Previous relayer
        previous: Option<Address>,
        /// New relayer
        relayer: Address,
    },

    /// Cross-domain request recorded for the relay to pick up
    RemoteRequested {
        /// Requested lane
        lane: Lane,
        /// Outbound sequence number
        sequence: u64,
        /// Local requester
        requester: Address,
        /// Target domain identifier
        destination_domain: u16,
        /// Receiver on the target domain
        receiver: Address,
        /// Requested amount
        amount: u64,
    },
}
