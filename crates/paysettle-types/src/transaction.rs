//! Ledger transaction types.
//!
//! A [`Transaction`] always carries a positive `amount`. Whether it adds to or
//! subtracts from the wallet is implied by its [`TransactionKind`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CorrelationId, OwnerId, TransactionId};

/// What a ledger entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    InstantPayout,
    PaymentOut,
    PaymentIn,
    EscrowFund,
    EscrowRelease,
    EscrowRefund,
    AgencyRevenueShare,
    ArbitrationFee,
    PayrollCharge,
    PayrollReceipt,
    SubscriptionFee,
    /// Treasury side of a platform, instant-payout, arbitration or
    /// subscription fee.
    PlatformFee,
    /// Treasury side of withheld tax.
    TaxWithholding,
    /// Treasury side of an EOR benefits deduction.
    BenefitsContribution,
}

impl TransactionKind {
    /// Whether this kind adds to the owning wallet.
    #[must_use]
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Deposit
                | Self::PaymentIn
                | Self::EscrowRelease
                | Self::EscrowRefund
                | Self::AgencyRevenueShare
                | Self::PayrollReceipt
                | Self::PlatformFee
                | Self::TaxWithholding
                | Self::BenefitsContribution
        )
    }

    #[must_use]
    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::InstantPayout => "INSTANT_PAYOUT",
            Self::PaymentOut => "PAYMENT_OUT",
            Self::PaymentIn => "PAYMENT_IN",
            Self::EscrowFund => "ESCROW_FUND",
            Self::EscrowRelease => "ESCROW_RELEASE",
            Self::EscrowRefund => "ESCROW_REFUND",
            Self::AgencyRevenueShare => "AGENCY_REVENUE_SHARE",
            Self::ArbitrationFee => "ARBITRATION_FEE",
            Self::PayrollCharge => "PAYROLL_CHARGE",
            Self::PayrollReceipt => "PAYROLL_RECEIPT",
            Self::SubscriptionFee => "SUBSCRIPTION_FEE",
            Self::PlatformFee => "PLATFORM_FEE",
            Self::TaxWithholding => "TAX_WITHHOLDING",
            Self::BenefitsContribution => "BENEFITS_CONTRIBUTION",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Credit awaiting clearing, or a payout reservation in flight.
    Pending,
    Completed,
    /// Reversed reservation. Funds were restored.
    Rejected,
    /// Completed instant payout.
    InstantProcessed,
}

impl TransactionStatus {
    /// Whether the transaction has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the transaction moved money for good.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::InstantProcessed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::InstantProcessed => write!(f, "INSTANT_PROCESSED"),
        }
    }
}

/// A single ledger entry belonging to one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner: OwnerId,
    pub kind: TransactionKind,
    /// Always positive; direction comes from `kind`.
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub fee_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    /// Caller-supplied reference (deposit id, contract id, ...).
    pub reference_id: Option<String>,
    /// Links counter-transactions across wallets.
    pub correlation_id: Option<CorrelationId>,
    /// Payout confirmation id returned by the rail.
    pub provider_ref: Option<String>,
    pub cost_center: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When a pending credit clears. `None` for reservations.
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Signed effect on the wallet: positive for credits, negative for debits.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }

    /// Whether this is a pending credit whose clearing date has passed.
    #[must_use]
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending
            && self.kind.is_credit()
            && self.cleared_at.is_some_and(|at| at <= now)
    }
}

/// Builder for a transaction before the ledger assigns id, owner and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDraft {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub fee_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub reference_id: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub provider_ref: Option<String>,
    pub cost_center: Option<String>,
    pub description: Option<String>,
    pub cleared_at: Option<DateTime<Utc>>,
}

impl TxDraft {
    /// A completed entry of `kind` for `amount`.
    #[must_use]
    pub fn new(kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            kind,
            amount,
            status: TransactionStatus::Completed,
            fee_amount: None,
            tax_amount: None,
            reference_id: None,
            correlation_id: None,
            provider_ref: None,
            cost_center: None,
            description: None,
            cleared_at: None,
        }
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn fee(mut self, fee: Decimal) -> Self {
        self.fee_amount = Some(fee);
        self
    }

    #[must_use]
    pub fn tax(mut self, tax: Decimal) -> Self {
        self.tax_amount = Some(tax);
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_id = Some(reference.into());
        self
    }

    #[must_use]
    pub fn correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation_id = Some(correlation);
        self
    }

    #[must_use]
    pub fn cost_center(mut self, cost_center: Option<String>) -> Self {
        self.cost_center = cost_center;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as a pending credit that clears at `at`.
    #[must_use]
    pub fn clears_at(mut self, at: DateTime<Utc>) -> Self {
        self.status = TransactionStatus::Pending;
        self.cleared_at = Some(at);
        self
    }

    /// Materialize the draft for `owner`.
    #[must_use]
    pub fn into_transaction(self, owner: OwnerId, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            owner,
            kind: self.kind,
            amount: self.amount,
            status: self.status,
            fee_amount: self.fee_amount,
            tax_amount: self.tax_amount,
            reference_id: self.reference_id,
            correlation_id: self.correlation_id,
            provider_ref: self.provider_ref,
            cost_center: self.cost_center,
            description: self.description,
            created_at: now,
            cleared_at: self.cleared_at,
        }
    }
}
