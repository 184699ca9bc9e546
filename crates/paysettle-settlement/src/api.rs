//! Request and response types of the settlement boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use paysettle_types::{
    ContractId, CorrelationId, EscrowHold, MethodId, MilestoneId, OwnerId, Transaction,
    TransactionId, TransactionKind, TransactionStatus, Wallet,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub owner: OwnerId,
    pub amount: Decimal,
    /// External payment id; a reference is applied at most once.
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub owner: OwnerId,
    pub amount: Decimal,
    #[serde(default)]
    pub instant: bool,
    /// Defaults to the owner's default method.
    #[serde(default)]
    pub method_id: Option<MethodId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: OwnerId,
    pub to: OwnerId,
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub contract: ContractId,
    pub milestone: MilestoneId,
    pub payee: OwnerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReleaseRequest {
    pub contract: ContractId,
    pub milestone: MilestoneId,
    pub freelancer: OwnerId,
    pub freelancer_percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRequest {
    pub employee: OwnerId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub gross: Decimal,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Wallet snapshot after lazy clearing, with the balance in the owner's
/// preferred currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletView {
    pub wallet: Wallet,
    /// Newest first.
    pub transactions: Vec<Transaction>,
    pub local_currency: String,
    pub local_available: Decimal,
    pub local_pending: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalOutcome {
    pub transaction: Transaction,
    pub fee: Decimal,
    /// Amount plus fee.
    pub total_debited: Decimal,
    pub provider_ref: String,
    /// What the rail paid out, in `payout_currency`.
    pub payout_amount: Decimal,
    pub payout_currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub correlation_id: CorrelationId,
    pub debit: TransactionId,
    pub credit: TransactionId,
    pub fee: Decimal,
    pub net: Decimal,
    pub clears_at: DateTime<Utc>,
}

/// How one release was divided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseBreakdown {
    pub payee: OwnerId,
    pub gross: Decimal,
    pub agency: Option<OwnerId>,
    pub agency_share: Decimal,
    pub tax: Decimal,
    /// Credited to the payee: `gross − agency_share − tax`.
    pub net: Decimal,
    pub transactions: Vec<TransactionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub hold: EscrowHold,
    pub breakdown: ReleaseBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReleaseOutcome {
    pub hold: EscrowHold,
    pub freelancer: ReleaseBreakdown,
    pub client_refund: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// `INV-` followed by the upper-case id fragment.
    pub number: String,
    pub transaction_id: TransactionId,
    pub owner: OwnerId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub tax_amount: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

/// Volume and counts over settled transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub settled_count: usize,
    pub settled_volume: Decimal,
    pub by_kind: BTreeMap<TransactionKind, KindMetrics>,
    pub fees_collected: Decimal,
    pub tax_withheld: Decimal,
    pub escrow_held: Decimal,
    pub wallet_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindMetrics {
    pub count: usize,
    pub volume: Decimal,
}

/// Outcome of one scheduled sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}
