//! Error types for the PaySettle settlement core.
//!
//! All errors use the `PS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Not found
//! - 2xx: Invalid state
//! - 3xx: Authorization
//! - 4xx: Funds
//! - 5xx: Upstream (external collaborators, payout rails)
//! - 6xx: Validation
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    CaseId, ContractId, DisputeId, MethodId, MilestoneId, OwnerId, SubscriptionId, TimeLogId,
    TransactionId,
};

/// Coarse classification used by callers to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    InvalidState,
    Authorization,
    Funds,
    Upstream,
    Validation,
    Internal,
}

/// Central error enum for all PaySettle operations.
#[derive(Debug, Clone, Error)]
pub enum PaysettleError {
    // =================================================================
    // Not Found (1xx)
    // =================================================================
    #[error("PS_ERR_100: Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// No active escrow hold exists for the milestone.
    #[error("PS_ERR_101: No active escrow hold for {contract} / {milestone}")]
    HoldNotFound {
        contract: ContractId,
        milestone: MilestoneId,
    },

    #[error("PS_ERR_102: Withdrawal method not found: {0}")]
    MethodNotFound(MethodId),

    #[error("PS_ERR_103: Dispute not found: {0}")]
    DisputeNotFound(DisputeId),

    #[error("PS_ERR_104: Arbitration case not found: {0}")]
    CaseNotFound(CaseId),

    #[error("PS_ERR_105: Time log not found: {0}")]
    TimeLogNotFound(TimeLogId),

    #[error("PS_ERR_106: Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("PS_ERR_107: Contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("PS_ERR_108: User profile not found: {0}")]
    UserNotFound(OwnerId),

    // =================================================================
    // Invalid State (2xx)
    // =================================================================
    /// The hold was already released or refunded.
    #[error("PS_ERR_200: Escrow hold already settled")]
    HoldAlreadySettled,

    #[error("PS_ERR_201: Dispute is not open")]
    DisputeNotOpen,

    /// Evidence can no longer be attached once review has started.
    #[error("PS_ERR_202: Evidence is locked for this dispute")]
    EvidenceLocked,

    #[error("PS_ERR_203: Time log is not pending")]
    TimeLogNotPending,

    /// The contract's status forbids the operation (paused, disputed, ...).
    #[error("PS_ERR_204: Contract not active: {reason}")]
    ContractNotActive { reason: String },

    #[error("PS_ERR_205: Operation requires a {expected} contract")]
    ContractKindMismatch { expected: String },

    #[error("PS_ERR_206: No default withdrawal method configured")]
    NoDefaultMethod,

    #[error("PS_ERR_207: Withdrawal method does not support instant payouts")]
    InstantNotSupported,

    #[error("PS_ERR_208: Payroll already processed for this period")]
    PayrollAlreadyProcessed,

    /// A deposit with this reference id was already applied.
    #[error("PS_ERR_209: Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("PS_ERR_210: Arbitration case is closed")]
    CaseClosed,

    #[error("PS_ERR_211: Milestone already has an active escrow hold")]
    EscrowAlreadyFunded,

    /// The dispute is under arbitration and only the case can settle it.
    #[error("PS_ERR_212: Dispute has an unresolved arbitration case")]
    ArbitrationPending,

    // =================================================================
    // Authorization (3xx)
    // =================================================================
    #[error("PS_ERR_300: {0} is not a participant")]
    NotAParticipant(OwnerId),

    #[error("PS_ERR_301: Withdrawal method does not belong to {0}")]
    MethodNotOwned(OwnerId),

    #[error("PS_ERR_302: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // =================================================================
    // Funds (4xx)
    // =================================================================
    #[error("PS_ERR_400: Insufficient funds for {owner}: need {needed}, have {available}")]
    InsufficientFunds {
        owner: OwnerId,
        needed: Decimal,
        available: Decimal,
    },

    /// A balance operation would produce a negative value.
    #[error("PS_ERR_401: Balance underflow")]
    BalanceUnderflow,

    /// A balance or running total would exceed the representable range.
    #[error("PS_ERR_402: Balance overflow")]
    BalanceOverflow,

    // =================================================================
    // Upstream (5xx)
    // =================================================================
    #[error("PS_ERR_500: Upstream unavailable: {service}: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    #[error("PS_ERR_501: Upstream timed out: {service}")]
    UpstreamTimeout { service: String },

    /// The payout rail rejected the transfer.
    #[error("PS_ERR_502: Payout rejected by {rail}: {reason}")]
    PayoutRejected { rail: String, reason: String },

    #[error("PS_ERR_503: No adapter registered for rail {0}")]
    RailUnavailable(String),

    // =================================================================
    // Validation (6xx)
    // =================================================================
    #[error("PS_ERR_600: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("PS_ERR_601: Invalid percentage: {0}")]
    InvalidPercentage(Decimal),

    #[error("PS_ERR_602: Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("PS_ERR_603: Unsupported withdrawal method type: {0}")]
    UnsupportedMethodType(String),

    #[error("PS_ERR_604: Invalid tax setting: {reason}")]
    InvalidTaxSetting { reason: String },

    #[error("PS_ERR_605: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PS_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("PS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("PS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("PS_ERR_903: I/O error: {0}")]
    Io(String),

    /// Ledger custody no longer matches deposits minus payouts.
    #[error("PS_ERR_904: Funds conservation violated: {reason}")]
    ConservationViolation { reason: String },
}

impl PaysettleError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TransactionNotFound(_)
            | Self::HoldNotFound { .. }
            | Self::MethodNotFound(_)
            | Self::DisputeNotFound(_)
            | Self::CaseNotFound(_)
            | Self::TimeLogNotFound(_)
            | Self::SubscriptionNotFound(_)
            | Self::ContractNotFound(_)
            | Self::UserNotFound(_) => ErrorClass::NotFound,

            Self::HoldAlreadySettled
            | Self::DisputeNotOpen
            | Self::EvidenceLocked
            | Self::TimeLogNotPending
            | Self::ContractNotActive { .. }
            | Self::ContractKindMismatch { .. }
            | Self::NoDefaultMethod
            | Self::InstantNotSupported
            | Self::PayrollAlreadyProcessed
            | Self::DuplicateReference(_)
            | Self::CaseClosed
            | Self::EscrowAlreadyFunded
            | Self::ArbitrationPending => ErrorClass::InvalidState,

            Self::NotAParticipant(_) | Self::MethodNotOwned(_) | Self::Unauthorized { .. } => {
                ErrorClass::Authorization
            }

            Self::InsufficientFunds { .. } | Self::BalanceUnderflow | Self::BalanceOverflow => {
                ErrorClass::Funds
            }

            Self::UpstreamUnavailable { .. }
            | Self::UpstreamTimeout { .. }
            | Self::PayoutRejected { .. }
            | Self::RailUnavailable(_) => ErrorClass::Upstream,

            Self::InvalidAmount { .. }
            | Self::InvalidPercentage(_)
            | Self::UnknownCurrency(_)
            | Self::UnsupportedMethodType(_)
            | Self::InvalidTaxSetting { .. }
            | Self::InvalidRequest { .. } => ErrorClass::Validation,

            Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_)
            | Self::ConservationViolation { .. } => ErrorClass::Internal,
        }
    }

    /// Only transient upstream failures are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamTimeout { .. }
        )
    }

    /// Shorthand for [`PaysettleError::InvalidAmount`].
    #[must_use]
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PaysettleError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PaysettleError>;

impl From<std::io::Error> for PaysettleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PaysettleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
