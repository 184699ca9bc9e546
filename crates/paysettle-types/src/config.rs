//! Configuration for the settlement core and its scheduler.
//!
//! Every field has a default drawn from [`crate::constants`], so an empty JSON
//! object is a valid configuration.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PaysettleError, constants};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "PAYSETTLE_CONFIG";

/// Top-level settlement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Platform base currency; wallets default to it and FX bridges through it.
    pub base_currency: String,
    /// Days before a transfer credit clears.
    pub clearing_days: i64,
    /// Timeout for every call to an external collaborator.
    pub upstream_timeout_ms: u64,
    pub fees: FeeConfig,
    pub fx: FxConfig,
    pub tax: TaxConfig,
    pub disputes: DisputeConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            base_currency: constants::BASE_CURRENCY.to_string(),
            clearing_days: constants::DEFAULT_CLEARING_DAYS,
            upstream_timeout_ms: constants::DEFAULT_UPSTREAM_TIMEOUT_MS,
            fees: FeeConfig::default(),
            fx: FxConfig::default(),
            tax: TaxConfig::default(),
            disputes: DisputeConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SettlementConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, PaysettleError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PaysettleError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PaysettleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PaysettleError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Load from `$PAYSETTLE_CONFIG` if set, otherwise use defaults.
    pub fn from_env() -> Result<Self, PaysettleError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), PaysettleError> {
        let percents = [
            ("fees.platform_fee_percent", self.fees.platform_fee_percent),
            ("fees.default_employer_fee_percent", self.fees.default_employer_fee_percent),
            ("fx.spread_percent", self.fx.spread_percent),
            ("tax.backup_withholding_percent", self.tax.backup_withholding_percent),
        ];
        for (name, value) in percents {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(PaysettleError::Configuration(format!(
                    "{name} must be within 0..=100, got {value}"
                )));
            }
        }
        if self.fees.instant_fee_rate < Decimal::ZERO || self.fees.instant_fee_rate >= Decimal::ONE
        {
            return Err(PaysettleError::Configuration(format!(
                "fees.instant_fee_rate must be a fraction, got {}",
                self.fees.instant_fee_rate
            )));
        }
        let flat_fees = [
            ("fees.instant_fee_minimum", self.fees.instant_fee_minimum),
            ("fees.crypto_network_fee", self.fees.crypto_network_fee),
            ("fees.arbitration_fee", self.fees.arbitration_fee),
        ];
        for (name, value) in flat_fees {
            if value < Decimal::ZERO {
                return Err(PaysettleError::Configuration(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        if self.clearing_days < 0 {
            return Err(PaysettleError::Configuration(
                "clearing_days must not be negative".into(),
            ));
        }
        if self.base_currency.trim().is_empty() {
            return Err(PaysettleError::Configuration("base_currency is empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    #[must_use]
    pub fn clearing_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.clearing_days)
    }
}

/// Platform fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Percent withheld from wallet-to-wallet transfers.
    pub platform_fee_percent: Decimal,
    /// Fraction of an instant payout charged as fee.
    pub instant_fee_rate: Decimal,
    pub instant_fee_minimum: Decimal,
    /// Flat fee on every crypto withdrawal.
    pub crypto_network_fee: Decimal,
    pub arbitration_fee: Decimal,
    pub default_employer_fee_percent: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: constants::DEFAULT_PLATFORM_FEE_PERCENT,
            instant_fee_rate: constants::INSTANT_FEE_RATE,
            instant_fee_minimum: constants::INSTANT_FEE_MINIMUM,
            crypto_network_fee: constants::CRYPTO_NETWORK_FEE,
            arbitration_fee: constants::ARBITRATION_FEE,
            default_employer_fee_percent: constants::DEFAULT_EMPLOYER_FEE_PERCENT,
        }
    }
}

impl FeeConfig {
    /// `max(amount × rate, minimum)`.
    #[must_use]
    pub fn instant_fee(&self, amount: Decimal) -> Decimal {
        (amount * self.instant_fee_rate).max(self.instant_fee_minimum)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub spread_percent: Decimal,
    pub cache_ttl_secs: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            spread_percent: constants::FX_SPREAD_PERCENT,
            cache_ttl_secs: constants::FX_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    pub cache_ttl_secs: u64,
    pub backup_withholding_jurisdiction: String,
    pub backup_withholding_percent: Decimal,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: constants::TAX_CACHE_TTL_SECS,
            backup_withholding_jurisdiction: constants::BACKUP_WITHHOLDING_JURISDICTION.to_string(),
            backup_withholding_percent: constants::BACKUP_WITHHOLDING_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    pub timeout_days: i64,
    pub auto_release_days: i64,
    pub evidence_retention_days: i64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            timeout_days: constants::DISPUTE_TIMEOUT_DAYS,
            auto_release_days: constants::AUTO_RELEASE_DAYS,
            evidence_retention_days: constants::EVIDENCE_RETENTION_DAYS,
        }
    }
}

/// Job cadences, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub auto_release_secs: u64,
    pub dispute_timeout_secs: u64,
    pub evidence_cleanup_secs: u64,
    pub auto_withdrawal_secs: u64,
    pub subscription_renewal_secs: u64,
    pub payroll_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_release_secs: constants::AUTO_RELEASE_INTERVAL_SECS,
            dispute_timeout_secs: constants::DISPUTE_TIMEOUT_INTERVAL_SECS,
            evidence_cleanup_secs: constants::DAILY_INTERVAL_SECS,
            auto_withdrawal_secs: constants::DAILY_INTERVAL_SECS,
            subscription_renewal_secs: constants::DAILY_INTERVAL_SECS,
            payroll_secs: constants::DAILY_INTERVAL_SECS,
        }
    }
}
