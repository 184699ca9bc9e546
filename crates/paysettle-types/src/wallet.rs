//! Wallet types for the PaySettle custodial ledger.
//!
//! Every owner has an `available` balance (spendable, withdrawable) and a
//! `pending` balance (credits waiting for their clearing date).

use chrono::{DateTime, Datelike, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::BASE_CURRENCY;
use crate::{MethodId, OwnerId};

/// How often the auto-withdrawal job may sweep a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalSchedule {
    /// Every run of the job.
    #[default]
    None,
    /// Mondays only.
    Weekly,
    /// First day of the month only.
    Monthly,
}

impl WithdrawalSchedule {
    /// Whether a sweep is allowed on the day containing `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::None => true,
            Self::Weekly => now.weekday() == Weekday::Mon,
            Self::Monthly => now.day() == 1,
        }
    }
}

impl std::fmt::Display for WithdrawalSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Weekly => write!(f, "WEEKLY"),
            Self::Monthly => write!(f, "MONTHLY"),
        }
    }
}

/// Auto-withdrawal configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoWithdrawal {
    pub enabled: bool,
    /// Minimum available balance before a sweep happens.
    pub threshold: Decimal,
    pub schedule: WithdrawalSchedule,
    /// Target method; `None` falls back to the owner's default method.
    pub method_id: Option<MethodId>,
}

impl Default for AutoWithdrawal {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: Decimal::ZERO,
            schedule: WithdrawalSchedule::None,
            method_id: None,
        }
    }
}

impl AutoWithdrawal {
    /// Whether `available` qualifies for a sweep under this configuration.
    #[must_use]
    pub fn should_sweep(&self, available: Decimal, now: DateTime<Utc>) -> bool {
        self.enabled
            && available > Decimal::ZERO
            && available >= self.threshold
            && self.schedule.is_due(now)
    }
}

/// User-editable wallet settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSettings {
    /// ISO currency code used for display and regional payouts.
    pub preferred_currency: String,
    pub auto_withdrawal: AutoWithdrawal,
    /// Destination of `CRYPTO` withdrawals.
    #[serde(default)]
    pub crypto_address: Option<String>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            preferred_currency: BASE_CURRENCY.to_string(),
            auto_withdrawal: AutoWithdrawal::default(),
            crypto_address: None,
        }
    }
}

/// A custodial wallet. One per owner, created lazily on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: OwnerId,
    /// Spendable balance. Never negative.
    pub available: Decimal,
    /// Credits awaiting their clearing date.
    pub pending: Decimal,
    pub settings: WalletSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet for `owner`.
    #[must_use]
    pub fn new(owner: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            available: Decimal::ZERO,
            pending: Decimal::ZERO,
            settings: WalletSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Total custody (available + pending).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available.saturating_add(self.pending)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.pending.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 3, 0, 0).unwrap()
    }

    #[test]
    fn new_wallet_is_empty_in_base_currency() {
        let wallet = Wallet::new(OwnerId::new(), Utc::now());
        assert!(wallet.is_zero());
        assert_eq!(wallet.settings.preferred_currency, "USD");
        assert!(!wallet.settings.auto_withdrawal.enabled);
    }

    #[test]
    fn wallet_total() {
        let mut wallet = Wallet::new(OwnerId::new(), Utc::now());
        wallet.available = Decimal::new(100, 0);
        wallet.pending = Decimal::new(50, 0);
        assert_eq!(wallet.total(), Decimal::new(150, 0));
    }

    #[test]
    fn schedule_gating() {
        // 2024-06-03 is a Monday, 2024-06-01 a Saturday.
        let monday = at(2024, 6, 3);
        let first = at(2024, 6, 1);
        let tuesday = at(2024, 6, 4);

        assert!(WithdrawalSchedule::None.is_due(tuesday));
        assert!(WithdrawalSchedule::Weekly.is_due(monday));
        assert!(!WithdrawalSchedule::Weekly.is_due(tuesday));
        assert!(WithdrawalSchedule::Monthly.is_due(first));
        assert!(!WithdrawalSchedule::Monthly.is_due(monday));
    }

    #[test]
    fn sweep_requires_positive_balance_over_threshold() {
        let now = at(2024, 6, 4);
        let config = AutoWithdrawal {
            enabled: true,
            threshold: Decimal::new(100, 0),
            schedule: WithdrawalSchedule::None,
            method_id: None,
        };
        assert!(config.should_sweep(Decimal::new(100, 0), now));
        assert!(!config.should_sweep(Decimal::new(99, 0), now));

        let zero_threshold = AutoWithdrawal {
            threshold: Decimal::ZERO,
            ..config.clone()
        };
        assert!(!zero_threshold.should_sweep(Decimal::ZERO, now));

        let disabled = AutoWithdrawal {
            enabled: false,
            ..config
        };
        assert!(!disabled.should_sweep(Decimal::new(500, 0), now));
    }

    #[test]
    fn schedule_serde_is_lowercase() {
        let json = serde_json::to_string(&WithdrawalSchedule::Weekly).unwrap();
        assert_eq!(json, "\"weekly\"");
    }
}
