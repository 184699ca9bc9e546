//! Globally unique identifiers used throughout PaySettle.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting. IDs
//! minted by external collaborators (users, contracts, milestones) are
//! accepted as-is and wrapped in the same newtype shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a `Copy` UUID newtype with a display prefix.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Last eight hex digits of the UUID, upper-cased.
            ///
            /// UUIDv7 leads with the timestamp, so the tail is the part that
            /// actually differs between IDs minted in the same second.
            #[must_use]
            pub fn short(&self) -> String {
                let simple = self.0.simple().to_string();
                simple[simple.len() - 8..].to_uppercase()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Ledger-owned identifiers
// ---------------------------------------------------------------------------

uuid_id!(
    /// Unique identifier for a ledger transaction.
    TransactionId,
    "tx"
);

uuid_id!(
    /// Links counter-transactions (e.g. a payment debit and its pending credit).
    CorrelationId,
    "corr"
);

uuid_id!(
    /// Unique identifier for a withdrawal method.
    MethodId,
    "wm"
);

uuid_id!(
    /// Unique identifier for an escrow hold.
    HoldId,
    "hold"
);

// ---------------------------------------------------------------------------
// Settlement-owned identifiers
// ---------------------------------------------------------------------------

uuid_id!(DisputeId, "dispute");
uuid_id!(CaseId, "case");
uuid_id!(EvidenceId, "evidence");
uuid_id!(TimeLogId, "timelog");
uuid_id!(SubscriptionId, "sub");
uuid_id!(PayrollId, "payroll");
uuid_id!(BenefitPlanId, "benefit");

// ---------------------------------------------------------------------------
// Collaborator-owned identifiers
// ---------------------------------------------------------------------------

uuid_id!(
    /// Contract identifier issued by the contract-management service.
    ContractId,
    "contract"
);

uuid_id!(
    /// Milestone identifier issued by the contract-management service.
    MilestoneId,
    "milestone"
);

// ---------------------------------------------------------------------------
// OwnerId
// ---------------------------------------------------------------------------

/// Identifier of a wallet owner (a user, an agency, or the platform treasury).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The platform treasury wallet. Receives fees and withheld tax.
    #[must_use]
    pub const fn treasury() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub fn is_treasury(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_treasury() {
            write!(f, "owner:treasury")
        } else {
            write!(f, "owner:{}", self.0)
        }
    }
}
