//! Escrow hold types.
//!
//! An [`EscrowHold`] is money a client committed against a contract
//! milestone. It moves from `Active` to exactly one terminal state:
//!
//! ```text
//! Active ──release──▶ Released
//!    │
//!    └────refund────▶ Refunded
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, HoldId, MilestoneId, OwnerId};

/// State of an escrow hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Released,
    Refunded,
}

impl HoldStatus {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// Terminal outcome requested when settling a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldOutcome {
    Released,
    Refunded,
}

impl From<HoldOutcome> for HoldStatus {
    fn from(outcome: HoldOutcome) -> Self {
        match outcome {
            HoldOutcome::Released => Self::Released,
            HoldOutcome::Refunded => Self::Refunded,
        }
    }
}

/// Funds held against a contract milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHold {
    pub id: HoldId,
    pub contract: ContractId,
    pub milestone: MilestoneId,
    /// Client whose wallet funded the hold.
    pub client: OwnerId,
    pub amount: Decimal,
    pub cost_center: Option<String>,
    pub status: HoldStatus,
    /// Freelancer who submitted the milestone for review.
    pub payee: Option<OwnerId>,
    /// Deadline after which the scheduler releases the hold automatically.
    pub auto_release_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl EscrowHold {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == HoldStatus::Active
    }

    /// Whether the hold is active, under review and past its deadline.
    #[must_use]
    pub fn is_due_for_auto_release(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.payee.is_some() && self.auto_release_at.is_some_and(|at| at <= now)
    }
}
