//! Withholding tax calculation.
//!
//! Resolution order for one payee:
//!
//! 1. Unverified payee in the backup-withholding jurisdiction → flat backup
//!    rate, no lookup.
//! 2. Cached or freshly loaded [`TaxSetting`]; absent, inactive, failing or
//!    timed-out lookups withhold nothing and log a warning.
//! 3. First bracket containing the amount, else the setting's flat rate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use paysettle_types::money::round_money;
use paysettle_types::{
    Clock, PaysettleError, Result, SettlementConfig, TaxAssessment, TaxBasis, TaxSetting,
};
use rust_decimal::Decimal;

/// Where tax settings live.
#[async_trait]
pub trait TaxSettingSource: Send + Sync {
    /// The setting for `jurisdiction`, or `None` if none is configured.
    async fn tax_setting(&self, jurisdiction: &str) -> Result<Option<TaxSetting>>;
}

/// Tax settings held in memory, editable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryTaxSettings {
    settings: RwLock<HashMap<String, TaxSetting>>,
}

impl InMemoryTaxSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(settings: impl IntoIterator<Item = TaxSetting>) -> Self {
        let store = Self::new();
        for setting in settings {
            store.upsert(setting);
        }
        store
    }

    /// Insert or replace; returns the previous setting.
    pub fn upsert(&self, setting: TaxSetting) -> Option<TaxSetting> {
        self.settings
            .write()
            .insert(setting.jurisdiction.clone(), setting)
    }

    pub fn remove(&self, jurisdiction: &str) -> Option<TaxSetting> {
        self.settings
            .write()
            .remove(&jurisdiction.to_ascii_uppercase())
    }

    /// All settings, sorted by jurisdiction.
    #[must_use]
    pub fn list(&self) -> Vec<TaxSetting> {
        let mut list: Vec<_> = self.settings.read().values().cloned().collect();
        list.sort_by(|a, b| a.jurisdiction.cmp(&b.jurisdiction));
        list
    }
}

#[async_trait]
impl TaxSettingSource for InMemoryTaxSettings {
    async fn tax_setting(&self, jurisdiction: &str) -> Result<Option<TaxSetting>> {
        Ok(self.settings.read().get(jurisdiction).cloned())
    }
}

struct CachedSetting {
    setting: Option<TaxSetting>,
    fetched_at: DateTime<Utc>,
}

pub struct TaxEngine {
    source: Arc<dyn TaxSettingSource>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    timeout: Duration,
    backup_jurisdiction: String,
    backup_percent: Decimal,
    cache: Mutex<HashMap<String, CachedSetting>>,
}

impl TaxEngine {
    #[must_use]
    pub fn new(
        source: Arc<dyn TaxSettingSource>,
        clock: Arc<dyn Clock>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            source,
            clock,
            ttl: chrono::Duration::seconds(i64::try_from(config.tax.cache_ttl_secs).unwrap_or(i64::MAX)),
            timeout: config.upstream_timeout(),
            backup_jurisdiction: config.tax.backup_withholding_jurisdiction.to_ascii_uppercase(),
            backup_percent: config.tax.backup_withholding_percent,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, jurisdiction: &str, now: DateTime<Utc>) -> Option<Option<TaxSetting>> {
        self.cache
            .lock()
            .get(jurisdiction)
            .filter(|c| now - c.fetched_at < self.ttl)
            .map(|c| c.setting.clone())
    }

    async fn setting(&self, jurisdiction: &str) -> Result<Option<TaxSetting>> {
        let now = self.clock.now();
        if let Some(hit) = self.cached(jurisdiction, now) {
            return Ok(hit);
        }
        let setting = tokio::time::timeout(self.timeout, self.source.tax_setting(jurisdiction))
            .await
            .map_err(|_| PaysettleError::UpstreamTimeout {
                service: "tax-settings".into(),
            })??;
        self.cache.lock().insert(
            jurisdiction.to_string(),
            CachedSetting {
                setting: setting.clone(),
                fetched_at: now,
            },
        );
        Ok(setting)
    }

    /// Tax due on `amount` for a payee in `jurisdiction`.
    ///
    /// Never fails: lookup problems withhold nothing and are logged.
    pub async fn calculate_tax(
        &self,
        amount: Decimal,
        jurisdiction: &str,
        is_verified: bool,
    ) -> TaxAssessment {
        let jurisdiction = jurisdiction.trim().to_ascii_uppercase();

        if jurisdiction == self.backup_jurisdiction && !is_verified {
            return TaxAssessment {
                tax_amount: round_money(amount * self.backup_percent / Decimal::ONE_HUNDRED),
                rate: self.backup_percent,
                basis: TaxBasis::BackupWithholding,
            };
        }

        let setting = match self.setting(&jurisdiction).await {
            Ok(Some(setting)) if setting.is_active => setting,
            Ok(_) => {
                tracing::warn!(jurisdiction = %jurisdiction, "no active tax setting, withholding 0%");
                return TaxAssessment::exempt();
            }
            Err(err) => {
                tracing::warn!(jurisdiction = %jurisdiction, error = %err, "tax setting lookup failed, withholding 0%");
                return TaxAssessment::exempt();
            }
        };

        let (rate, basis) = setting.rate_for(amount);
        TaxAssessment {
            tax_amount: round_money(amount * rate / Decimal::ONE_HUNDRED),
            rate,
            basis,
        }
    }

    /// Forget the cached setting for one jurisdiction.
    pub fn invalidate(&self, jurisdiction: &str) {
        self.cache.lock().remove(&jurisdiction.to_ascii_uppercase());
    }

    pub fn invalidate_all(&self) {
        self.cache.lock().clear();
    }
}
