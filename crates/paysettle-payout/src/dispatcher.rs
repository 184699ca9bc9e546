//! Routes a payout to the rail matching the payee's withdrawal method.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use paysettle_ledger::MethodBook;
use paysettle_rates::CurrencyConverter;
use paysettle_types::{
    MethodId, OwnerId, PaysettleError, Result, SettlementConfig, TransactionId,
    WithdrawalMethodKind,
};
use rust_decimal::Decimal;

use crate::rails::{CryptoRail, PayoutReceipt, PayoutRequest, RailAdapter, SimulatedRail};

/// Registry of rail adapters, one per method kind.
#[derive(Default)]
pub struct RailRegistry {
    adapters: HashMap<WithdrawalMethodKind, Arc<dyn RailAdapter>>,
}

impl RailRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a [`SimulatedRail`] for every kind but `CRYPTO`,
    /// which gets a [`CryptoRail`].
    #[must_use]
    pub fn simulated() -> Self {
        let mut registry = Self::new();
        for kind in WithdrawalMethodKind::ALL {
            registry.register(Arc::new(SimulatedRail::new(kind)));
        }
        registry.register(Arc::new(CryptoRail));
        registry
    }

    /// Register `adapter`, replacing any adapter for the same rail.
    pub fn register(&mut self, adapter: Arc<dyn RailAdapter>) {
        self.adapters.insert(adapter.rail(), adapter);
    }

    #[must_use]
    pub fn get(&self, rail: WithdrawalMethodKind) -> Option<Arc<dyn RailAdapter>> {
        self.adapters.get(&rail).cloned()
    }

    #[must_use]
    pub fn has(&self, rail: WithdrawalMethodKind) -> bool {
        self.adapters.contains_key(&rail)
    }
}

/// Currency a rail pays out in.
fn payout_currency<'a>(rail: WithdrawalMethodKind, preferred: &'a str, base: &'a str) -> &'a str {
    if rail.is_regional() { preferred } else { base }
}

/// A payout backed by an open ledger reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOrder {
    pub reservation: TransactionId,
    pub owner: OwnerId,
    pub method: MethodId,
    /// Amount in the platform base currency.
    pub amount: Decimal,
    pub preferred_currency: String,
    /// Wallet's on-chain address; required by `CRYPTO` methods.
    pub crypto_address: Option<String>,
    pub instant: bool,
}

pub struct PayoutDispatcher {
    methods: Arc<MethodBook>,
    rails: RailRegistry,
    fx: Arc<CurrencyConverter>,
    timeout: Duration,
}

impl PayoutDispatcher {
    #[must_use]
    pub fn new(
        methods: Arc<MethodBook>,
        rails: RailRegistry,
        fx: Arc<CurrencyConverter>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            methods,
            rails,
            fx,
            timeout: config.upstream_timeout(),
        }
    }

    /// Send `order` over the rail of its withdrawal method.
    ///
    /// # Errors
    /// - `MethodNotFound` / `MethodNotOwned` when the method is not the owner's
    /// - `InstantNotSupported` for instant orders on a standard method
    /// - `InvalidRequest` for a `CRYPTO` method without a wallet address
    /// - `RailUnavailable` when no adapter serves the method's kind
    /// - `UpstreamTimeout` when the rail does not answer in time
    /// - whatever the adapter returns, e.g. `PayoutRejected`
    pub async fn payout(&self, order: &PayoutOrder) -> Result<PayoutReceipt> {
        let method = self.methods.get_owned(order.owner, order.method)?;
        if order.instant && !method.instant_capable {
            return Err(PaysettleError::InstantNotSupported);
        }
        let adapter = self
            .rails
            .get(method.kind)
            .ok_or_else(|| PaysettleError::RailUnavailable(method.kind.to_string()))?;

        let provider_account = if method.kind == WithdrawalMethodKind::Crypto {
            order
                .crypto_address
                .clone()
                .ok_or_else(|| PaysettleError::invalid_request("no crypto address on file"))?
        } else {
            method.provider_account
        };

        let base = self.fx.base_currency();
        let currency = payout_currency(method.kind, &order.preferred_currency, base).to_string();
        let amount = if currency == base {
            order.amount
        } else {
            self.fx.convert(order.amount, base, &currency).await?
        };

        let request = PayoutRequest {
            reservation: order.reservation,
            owner: order.owner,
            method: method.id,
            rail: method.kind,
            provider_account,
            amount,
            currency,
            instant: order.instant,
        };

        let receipt = tokio::time::timeout(self.timeout, adapter.send(&request))
            .await
            .map_err(|_| PaysettleError::UpstreamTimeout {
                service: format!("rail:{}", method.kind),
            })??;

        tracing::info!(
            owner = %order.owner,
            rail = %receipt.rail,
            amount = %receipt.amount,
            currency = %receipt.currency,
            provider_ref = %receipt.provider_ref,
            "payout dispatched"
        );
        Ok(receipt)
    }
}
