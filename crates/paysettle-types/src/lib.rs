//! # paysettle-types
//!
//! Shared types, errors, and configuration for the **PaySettle** settlement core.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`OwnerId`], [`TransactionId`], [`HoldId`], [`MethodId`], [`ContractId`], ...
//! - **Wallet model**: [`Wallet`], [`WalletSettings`], [`AutoWithdrawal`], [`WithdrawalSchedule`]
//! - **Transaction model**: [`Transaction`], [`TransactionKind`], [`TransactionStatus`], [`TxDraft`]
//! - **Escrow model**: [`EscrowHold`], [`HoldStatus`], [`HoldOutcome`]
//! - **Payout model**: [`WithdrawalMethod`], [`WithdrawalMethodKind`]
//! - **Tax model**: [`TaxSetting`], [`TaxBracket`], [`TaxAssessment`]
//! - **Disputes**: [`Dispute`], [`ArbitrationCase`], [`Evidence`]
//! - **Billing**: [`TimeLog`], [`Subscription`], [`PayrollRecord`], [`BenefitPlan`]
//! - **External views**: [`ContractInfo`], [`UserProfile`]
//! - **Configuration**: [`SettlementConfig`]
//! - **Errors**: [`PaysettleError`] with `PS_ERR_` prefix codes
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Constants**: system-wide limits and defaults

pub mod billing;
pub mod clock;
pub mod config;
pub mod constants;
pub mod contract;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod method;
pub mod money;
pub mod tax;
pub mod transaction;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use paysettle_types::{Wallet, Transaction, EscrowHold, ...};

pub use billing::*;
pub use clock::*;
pub use config::*;
pub use contract::*;
pub use dispute::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use method::*;
pub use tax::*;
pub use transaction::*;
pub use wallet::*;

// Constants and money helpers are accessed via their modules
// (`paysettle_types::constants::FOO`, `paysettle_types::money::round_money`).
