//! System-wide constants for the PaySettle settlement core.
//!
//! Percentages are expressed in whole percent (`10` means 10%) unless the
//! name says `_RATE`, in which case the value is a fraction.

use rust_decimal::Decimal;

/// Decimal places for settled money amounts.
pub const MONEY_SCALE: u32 = 2;

/// Platform base currency for the FX rate table.
pub const BASE_CURRENCY: &str = "USD";

/// Days a transfer credit stays pending before it clears.
pub const DEFAULT_CLEARING_DAYS: i64 = 5;

/// Platform fee withheld from wallet-to-wallet transfers (percent).
pub const DEFAULT_PLATFORM_FEE_PERCENT: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Instant payout fee as a fraction of the amount (1.5%).
pub const INSTANT_FEE_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

/// Minimum instant payout fee.
pub const INSTANT_FEE_MINIMUM: Decimal = Decimal::from_parts(200, 0, 0, false, 2);

/// Flat network fee on a crypto withdrawal.
pub const CRYPTO_NETWORK_FEE: Decimal = Decimal::from_parts(100, 0, 0, false, 2);

/// FX spread charged against the caller (percent).
pub const FX_SPREAD_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// FX rate table cache lifetime in seconds (24 h).
pub const FX_CACHE_TTL_SECS: u64 = 86_400;

/// Tax setting cache lifetime in seconds (10 min).
pub const TAX_CACHE_TTL_SECS: u64 = 600;

/// Jurisdiction where unverified payees are subject to backup withholding.
pub const BACKUP_WITHHOLDING_JURISDICTION: &str = "US";

/// Backup withholding rate (percent).
pub const BACKUP_WITHHOLDING_PERCENT: Decimal = Decimal::from_parts(24, 0, 0, false, 0);

/// Fixed arbitration fee, split evenly between both parties.
pub const ARBITRATION_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Days an open dispute waits before system escalation.
pub const DISPUTE_TIMEOUT_DAYS: i64 = 7;

/// Days after review submission before an escrow hold auto-releases.
pub const AUTO_RELEASE_DAYS: i64 = 14;

/// Days evidence is retained after a dispute is resolved.
pub const EVIDENCE_RETENTION_DAYS: i64 = 60;

/// Timeout for calls to external collaborators, in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 5_000;

/// Employer fee on EOR payroll (percent) when the contract does not set one.
pub const DEFAULT_EMPLOYER_FEE_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Days in the nominal month used to apportion benefit costs.
pub const BENEFIT_MONTH_DAYS: i64 = 30;

/// Length of one subscription billing cycle.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Largest amount a single request may carry (one trillion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Maximum hours a single time log may record.
pub const MAX_HOURS_PER_LOG: Decimal = Decimal::from_parts(24, 0, 0, false, 0);

/// Capacity of the deposit / payroll replay guards.
pub const IDEMPOTENCY_CAPACITY: usize = 100_000;

/// Scheduler cadence: auto-release scan (6 h).
pub const AUTO_RELEASE_INTERVAL_SECS: u64 = 6 * 3_600;

/// Scheduler cadence: dispute timeout scan (12 h).
pub const DISPUTE_TIMEOUT_INTERVAL_SECS: u64 = 12 * 3_600;

/// Scheduler cadence: daily jobs (cleanup, auto-withdrawal, renewals, payroll).
pub const DAILY_INTERVAL_SECS: u64 = 24 * 3_600;

/// Resolution text recorded when a dispute escalates on inactivity.
pub const SYSTEM_ESCALATION_RESOLUTION: &str = "System escalation due to inactivity.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_constants_have_expected_values() {
        assert_eq!(DEFAULT_PLATFORM_FEE_PERCENT, Decimal::new(10, 0));
        assert_eq!(INSTANT_FEE_RATE, Decimal::new(15, 3));
        assert_eq!(INSTANT_FEE_MINIMUM, Decimal::new(2, 0));
        assert_eq!(FX_SPREAD_PERCENT, Decimal::new(5, 1));
        assert_eq!(BACKUP_WITHHOLDING_PERCENT, Decimal::new(24, 0));
        assert_eq!(ARBITRATION_FEE, Decimal::new(50, 0));
        assert_eq!(DEFAULT_EMPLOYER_FEE_PERCENT, Decimal::new(5, 0));
    }
}
