//! Ledger-facing identifiers, objects and transaction effects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// LOTTERY CONSTANTS
// =============================================================================

/// Smallest ticket number accepted by `buy_ticket` (Move `u16`).
pub const TICKET_NUMBER_MIN: i64 = 0;

/// Largest ticket number accepted by `buy_ticket` (Move `u16`).
pub const TICKET_NUMBER_MAX: i64 = u16::MAX as i64;

/// Minimum time between two draw submissions from the same address.
pub const DRAW_COOLDOWN: Duration = Duration::from_secs(30);

/// Wall clock in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Account address of the connected wallet
    Address
);
string_id!(
    /// Ledger object identifier
    ObjectId
);
string_id!(
    /// Transaction digest returned by the wallet on submission
    TxDigest
);

/// Validated ticket number (0..=65535)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketNumber(pub u16);

impl TicketNumber {
    pub fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for TicketNumber {
    type Error = i64;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        if (TICKET_NUMBER_MIN..=TICKET_NUMBER_MAX).contains(&n) {
            Ok(Self(n as u16))
        } else {
            Err(n)
        }
    }
}

impl FromStr for TicketNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let n: i64 = trimmed.parse().map_err(|_| trimmed.to_string())?;
        Self::try_from(n).map_err(|n| n.to_string())
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// OBJECTS AND EFFECTS
// =============================================================================

/// Typed unit of on-chain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerObject {
    pub id: ObjectId,
    /// Fully qualified Move type, e.g. `0x2c..::lottery::LuckyNumber`
    pub object_type: String,
    /// `None` for shared or immutable objects
    pub owner: Option<Address>,
    pub version: u64,
    /// Move struct fields rendered as JSON
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub owner: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure(String),
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

/// Effects of a finalized transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub digest: TxDigest,
    pub status: ExecutionStatus,
    /// Objects created by the transaction, in creation order
    pub created: Vec<ObjectRef>,
}

impl TransactionEffects {
    /// First created object, where a purchase puts the new ticket
    pub fn first_created(&self) -> Option<&ObjectId> {
        self.created.first().map(|r| &r.id)
    }
}

/// Display data of the held ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInfo {
    pub id: ObjectId,
    /// `None` when the object content could not be decoded
    pub number: Option<u16>,
}
