//! `settlementd`: runs the settlement jobs until interrupted.
//!
//! Environment:
//!   PAYSETTLE_CONFIG   - path to a JSON `SettlementConfig` (defaults apply when unset)
//!   RUST_LOG           - log filter (default: info)
//!   PAYSETTLE_LOG_JSON - emit JSON log lines when set to 1 or true

use std::sync::Arc;

use paysettle_payout::RailRegistry;
use paysettle_rates::{InMemoryTaxSettings, StaticRateSource, fallback_rates_for};
use paysettle_scheduler::settlement_scheduler;
use paysettle_settlement::{
    DisputeDesk, InMemoryContracts, InMemoryUsers, LogNotifier, Ports, SettlementController,
};
use paysettle_types::{PaysettleError, Result, SettlementConfig, SystemClock};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PAYSETTLE_LOG_JSON")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| PaysettleError::Io(e.to_string()))?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.map_err(|e| PaysettleError::Io(e.to_string()))?;
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = terminate.recv() => {
                tracing::info!("received terminate signal, shutting down");
            }
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| PaysettleError::Io(e.to_string()))?;
        tracing::info!("received ctrl-c, shutting down");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = SettlementConfig::from_env()?;
    config.validate()?;
    tracing::info!(
        base_currency = %config.base_currency,
        clearing_days = config.clearing_days,
        upstream_timeout_ms = config.upstream_timeout_ms,
        "configuration loaded"
    );

    let ports = Ports {
        contracts: Arc::new(InMemoryContracts::new()),
        users: Arc::new(InMemoryUsers::new()),
        notifier: Arc::new(LogNotifier),
        rates: Arc::new(StaticRateSource::new(
            config.base_currency.clone(),
            fallback_rates_for(&config.base_currency)?,
        )),
        tax_settings: Arc::new(InMemoryTaxSettings::new()),
        rails: RailRegistry::simulated(),
    };
    let scheduler_config = config.scheduler.clone();
    let controller = Arc::new(SettlementController::new(
        config,
        Arc::new(SystemClock),
        ports,
    ));
    let desk = Arc::new(DisputeDesk::new(Arc::clone(&controller)));

    let scheduler = settlement_scheduler(&controller, &desk, &scheduler_config)?;
    tracing::info!(jobs = ?scheduler.job_names(), "settlementd starting");
    let handle = scheduler.start();

    let signal = shutdown_signal().await;
    handle.shutdown().await;
    controller.verify_conservation()?;
    signal
}
