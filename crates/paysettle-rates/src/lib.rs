//! # paysettle-rates
//!
//! Pure money computations that depend on external reference data:
//!
//! - [`CurrencyConverter`]: cached FX table with fallback, spread-bearing conversion
//! - [`TaxEngine`]: backup withholding, flat and bracketed jurisdiction rules
//!
//! Both consume their data through async source traits ([`RateSource`],
//! [`TaxSettingSource`]) and degrade instead of failing when the source is
//! unavailable.

pub mod currency;
pub mod tax;

pub use currency::{
    CurrencyConverter, RateSource, RateTable, StaticRateSource, fallback_rates, fallback_rates_for,
};
pub use tax::{InMemoryTaxSettings, TaxEngine, TaxSettingSource};
