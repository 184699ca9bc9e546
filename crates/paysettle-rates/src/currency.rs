//! Currency conversion with a platform spread.
//!
//! Rates are fetched for the platform base currency, cached for a bounded
//! TTL, and replaced by a fixed fallback table when the source fails or
//! times out. Conversion bridges through the base currency, applies the
//! spread against the caller, and truncates to cents.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use paysettle_types::constants::BASE_CURRENCY;
use paysettle_types::money::truncate_money;
use paysettle_types::{Clock, PaysettleError, Result, SettlementConfig};
use rust_decimal::Decimal;

/// Units of each currency per one unit of the table's base.
pub type RateTable = BTreeMap<String, Decimal>;

/// Source of live exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, base: &str) -> Result<RateTable>;
}

/// Rates used when the source is unavailable, quoted per 1 USD
/// ([`BASE_CURRENCY`]). See [`fallback_rates_for`] for other bases.
#[must_use]
pub fn fallback_rates() -> RateTable {
    [
        ("USD", Decimal::ONE),
        ("EUR", Decimal::new(92, 2)),
        ("GBP", Decimal::new(79, 2)),
        ("JPY", Decimal::new(150, 0)),
        ("CAD", Decimal::new(135, 2)),
        ("AUD", Decimal::new(152, 2)),
        ("VND", Decimal::new(24_500, 0)),
        ("BRL", Decimal::new(495, 2)),
        ("THB", Decimal::new(355, 1)),
        ("KES", Decimal::new(160, 0)),
        ("NGN", Decimal::new(1_400, 0)),
    ]
    .into_iter()
    .map(|(code, rate)| (code.to_string(), rate))
    .collect()
}

/// The fallback table re-expressed per one unit of `base`.
///
/// # Errors
/// `UnknownCurrency` if the fallback table does not quote `base`.
pub fn fallback_rates_for(base: &str) -> Result<RateTable> {
    if normalize(base) == BASE_CURRENCY {
        return Ok(fallback_rates());
    }
    rebase(&fallback_rates(), base)
}

/// A rate source backed by a fixed, editable table.
#[derive(Debug)]
pub struct StaticRateSource {
    base: String,
    rates: RwLock<RateTable>,
}

impl StaticRateSource {
    #[must_use]
    pub fn new(base: impl Into<String>, rates: RateTable) -> Self {
        Self {
            base: base.into(),
            rates: RwLock::new(rates),
        }
    }

    pub fn set_rate(&self, currency: &str, rate: Decimal) {
        self.rates.write().insert(currency.to_ascii_uppercase(), rate);
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_rates(&self, base: &str) -> Result<RateTable> {
        let table = self.rates.read().clone();
        if base.eq_ignore_ascii_case(&self.base) {
            Ok(table)
        } else {
            rebase(&table, base)
        }
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn rate_of(table: &RateTable, code: &str) -> Result<Decimal> {
    table
        .get(code)
        .copied()
        .filter(|r| *r > Decimal::ZERO)
        .ok_or_else(|| PaysettleError::UnknownCurrency(code.to_string()))
}

/// Re-express `table` relative to `base`.
fn rebase(table: &RateTable, base: &str) -> Result<RateTable> {
    let base = normalize(base);
    let pivot = rate_of(table, &base)?;
    Ok(table
        .iter()
        .map(|(code, rate)| (code.clone(), *rate / pivot))
        .collect())
}

struct CachedTable {
    table: RateTable,
    fetched_at: DateTime<Utc>,
}

pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    base: String,
    spread_percent: Decimal,
    ttl: chrono::Duration,
    timeout: Duration,
    cache: Mutex<Option<CachedTable>>,
}

impl CurrencyConverter {
    #[must_use]
    pub fn new(
        source: Arc<dyn RateSource>,
        clock: Arc<dyn Clock>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            source,
            clock,
            base: normalize(&config.base_currency),
            spread_percent: config.fx.spread_percent,
            ttl: chrono::Duration::seconds(i64::try_from(config.fx.cache_ttl_secs).unwrap_or(i64::MAX)),
            timeout: config.upstream_timeout(),
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn base_currency(&self) -> &str {
        &self.base
    }

    fn cached(&self, now: DateTime<Utc>) -> Option<RateTable> {
        self.cache
            .lock()
            .as_ref()
            .filter(|c| now - c.fetched_at < self.ttl)
            .map(|c| c.table.clone())
    }

    /// The base-currency table: cached, freshly fetched, or the fallback.
    async fn platform_rates(&self) -> RateTable {
        let now = self.clock.now();
        if let Some(table) = self.cached(now) {
            return table;
        }

        match tokio::time::timeout(self.timeout, self.source.fetch_rates(&self.base)).await {
            Ok(Ok(mut table)) => {
                table.insert(self.base.clone(), Decimal::ONE);
                tracing::info!(base = %self.base, currencies = table.len(), "exchange rates refreshed");
                *self.cache.lock() = Some(CachedTable {
                    table: table.clone(),
                    fetched_at: now,
                });
                table
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "rate source failed, using fallback rates");
                self.fallback()
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "rate source timed out, using fallback rates");
                self.fallback()
            }
        }
    }

    /// Fallback rates per one unit of the platform base.
    fn fallback(&self) -> RateTable {
        fallback_rates_for(&self.base).unwrap_or_else(|err| {
            tracing::error!(base = %self.base, error = %err, "fallback table does not quote the base currency");
            RateTable::from([(self.base.clone(), Decimal::ONE)])
        })
    }

    /// Rate table relative to `base`.
    pub async fn get_rates(&self, base: &str) -> Result<RateTable> {
        let table = self.platform_rates().await;
        if normalize(base) == self.base {
            Ok(table)
        } else {
            rebase(&table, base)
        }
    }

    /// Convert `amount` from one currency to another.
    ///
    /// Identity when `from == to`. Otherwise the amount is bridged through
    /// the base currency, reduced by the spread, and truncated to cents.
    pub async fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal> {
        let from = normalize(from);
        let to = normalize(to);
        if from == to {
            return Ok(amount);
        }
        let table = self.platform_rates().await;
        let from_rate = rate_of(&table, &from)?;
        let to_rate = rate_of(&table, &to)?;

        let raw = amount / from_rate * to_rate;
        let spread = Decimal::ONE - self.spread_percent / Decimal::ONE_HUNDRED;
        Ok(truncate_money(raw * spread))
    }

    /// Drop the cached table so the next call refetches.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}
