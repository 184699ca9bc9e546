//! # paysettle-settlement
//!
//! The settlement controller: every operation that moves money between
//! wallets, escrow holds, payout rails and the platform treasury.
//!
//! ## Operation shape
//!
//! Each operation follows the same sequence:
//! 1. Validate the request
//! 2. Read external collaborators (contracts, users, tax, FX), each bounded
//!    by the upstream timeout
//! 3. Apply every ledger effect in one atomic unit, or none of them
//! 4. Notify affected owners after commit; notification failures are logged
//!
//! Payouts are the exception to step 3: the amount is reserved first,
//! the rail is called, then the reservation is finalized or reversed.
//!
//! ## Funds conservation
//!
//! `deposits − payouts == Σ wallet custody + Σ escrow held` holds after every
//! operation; [`SettlementController::verify_conservation`] checks it.

pub mod api;
pub mod controller;
pub mod directory;
pub mod dispute;
pub mod payroll;
pub mod ports;
pub mod subscription;
pub mod timelog;

pub use api::{
    BatchReport, DepositRequest, Invoice, KindMetrics, Metrics, PayrollRequest, ReleaseBreakdown,
    ReleaseOutcome, ReleaseRequest, SplitReleaseOutcome, SplitReleaseRequest, TransferOutcome,
    TransferRequest, WalletView, WithdrawRequest, WithdrawalOutcome,
};
pub use controller::{Ports, SettlementController, split_revenue};
pub use directory::{InMemoryContracts, InMemoryUsers, LogNotifier, RecordingNotifier};
pub use dispute::{DisputeDesk, evidence_digest};
pub use ports::{
    ContractDirectory, Notification, NotificationKind, Notifier, PayrollDue, UserDirectory,
};
