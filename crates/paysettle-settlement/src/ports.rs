//! Ports to collaborators the settlement core does not own.
//!
//! Contracts, user profiles and notification delivery live elsewhere. The
//! controller reads contracts and profiles before it opens a ledger unit and
//! emits notifications after the unit committed.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use paysettle_types::{ContractId, ContractInfo, OwnerId, Result, UserProfile};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An EOR payroll run the contract service considers due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollDue {
    pub contract: ContractId,
    pub employee: OwnerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub gross: Decimal,
}

#[async_trait]
pub trait ContractDirectory: Send + Sync {
    /// # Errors
    /// `ContractNotFound` when the id is unknown.
    async fn contract(&self, id: ContractId) -> Result<ContractInfo>;

    /// EOR payroll runs whose period has ended by `now`.
    async fn eor_contracts_due(&self, now: DateTime<Utc>) -> Result<Vec<PayrollDue>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// # Errors
    /// `UserNotFound` when the id is unknown.
    async fn profile(&self, id: OwnerId) -> Result<UserProfile>;
}

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    DepositReceived,
    WithdrawalCompleted,
    WithdrawalFailed,
    PaymentReceived,
    EscrowFunded,
    EscrowSubmitted,
    EscrowReleased,
    EscrowRefunded,
    TimeLogged,
    TimeLogApproved,
    TimeLogRejected,
    PayrollProcessed,
    SubscriptionRenewed,
    SubscriptionPastDue,
    DisputeOpened,
    DisputeEscalated,
    DisputeResolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: OwnerId,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    #[must_use]
    pub fn new(recipient: OwnerId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            recipient,
            kind,
            message: message.into(),
        }
    }
}

/// Fire-and-forget delivery. Failures are logged by the caller and never
/// undo the operation that produced the notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
