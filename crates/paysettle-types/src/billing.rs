//! Time logs, subscriptions and EOR payroll records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::{BENEFIT_MONTH_DAYS, MONEY_SCALE};
use crate::{BenefitPlanId, ContractId, OwnerId, PayrollId, PaysettleError, SubscriptionId, TimeLogId};

// ---------------------------------------------------------------------------
// Time logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeLogStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for TimeLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Hours a freelancer logged against an hourly contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLog {
    pub id: TimeLogId,
    pub contract: ContractId,
    pub freelancer: OwnerId,
    pub hours: Decimal,
    pub description: String,
    pub work_date: NaiveDate,
    pub status: TimeLogStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Expired,
    Cancelled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::PastDue => write!(f, "PAST_DUE"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner: OwnerId,
    pub plan: String,
    pub price: Decimal,
    pub status: SubscriptionStatus,
    pub next_billing_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// The record this one renewed, if any.
    pub renewed_from: Option<SubscriptionId>,
}

impl Subscription {
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.next_billing_at <= now
    }
}

// ---------------------------------------------------------------------------
// Payroll
// ---------------------------------------------------------------------------

/// A company-wide benefit deducted from EOR payroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitPlan {
    pub id: BenefitPlanId,
    pub name: String,
    pub monthly_cost: Decimal,
    pub is_active: bool,
}

/// Inclusive payroll period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayrollPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayrollPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PaysettleError> {
        if end < start {
            return Err(PaysettleError::invalid_request(format!(
                "payroll period ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days covered, both ends included.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// `monthly_cost` apportioned over this period, rounded to cents.
    #[must_use]
    pub fn apportion(&self, monthly_cost: Decimal) -> Decimal {
        (monthly_cost * Decimal::from(self.days()) / Decimal::from(BENEFIT_MONTH_DAYS))
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl std::fmt::Display for PayrollPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One processed payroll run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRecord {
    pub id: PayrollId,
    pub contract: ContractId,
    pub employee: OwnerId,
    pub period: PayrollPeriod,
    pub gross: Decimal,
    pub tax: Decimal,
    pub benefits: Decimal,
    pub employer_fee: Decimal,
    pub net: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl PayrollRecord {
    /// What the client is charged.
    #[must_use]
    pub fn client_charge(&self) -> Decimal {
        self.gross + self.employer_fee
    }
}
