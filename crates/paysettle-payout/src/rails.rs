//! Payout rail adapters.
//!
//! A [`RailAdapter`] moves money out of custody over one provider rail and
//! answers with the provider's confirmation id. The simulated adapters mint
//! deterministic-looking ids so tests and the daemon run without any
//! provider account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paysettle_types::{
    MethodId, OwnerId, PaysettleError, Result, TransactionId, WithdrawalMethodKind,
    is_valid_crypto_address,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One outbound transfer handed to a rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// The ledger reservation this payout settles.
    pub reservation: TransactionId,
    pub owner: OwnerId,
    pub method: MethodId,
    pub rail: WithdrawalMethodKind,
    /// Provider account, or the on-chain address for `CRYPTO`.
    pub provider_account: String,
    /// Amount in `currency`, already converted for regional rails.
    pub amount: Decimal,
    pub currency: String,
    pub instant: bool,
}

/// Provider confirmation of a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub provider_ref: String,
    pub rail: WithdrawalMethodKind,
    pub amount: Decimal,
    pub currency: String,
    pub settled_at: DateTime<Utc>,
}

/// Pluggable outbound rail.
#[async_trait]
pub trait RailAdapter: Send + Sync {
    fn rail(&self) -> WithdrawalMethodKind;

    async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt>;
}

/// Prefix of the confirmation ids a provider returns.
#[must_use]
pub fn provider_prefix(rail: WithdrawalMethodKind) -> &'static str {
    match rail {
        WithdrawalMethodKind::Bank => "ACH",
        WithdrawalMethodKind::Card => "CARD",
        WithdrawalMethodKind::Momo => "MOMO",
        WithdrawalMethodKind::Pix => "PIX",
        WithdrawalMethodKind::PromptPay => "PPAY",
        WithdrawalMethodKind::MPesa => "MPESA",
        WithdrawalMethodKind::Wise => "WISE",
        WithdrawalMethodKind::Payoneer => "PAYO",
        WithdrawalMethodKind::Crypto => "USDC",
    }
}

/// Simulated rail that accepts every payout.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedRail {
    rail: WithdrawalMethodKind,
}

impl SimulatedRail {
    #[must_use]
    pub fn new(rail: WithdrawalMethodKind) -> Self {
        Self { rail }
    }
}

#[async_trait]
impl RailAdapter for SimulatedRail {
    fn rail(&self) -> WithdrawalMethodKind {
        self.rail
    }

    async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt> {
        let speed = if request.instant { "I" } else { "S" };
        Ok(PayoutReceipt {
            provider_ref: format!(
                "{}_{speed}{}",
                provider_prefix(self.rail),
                request.reservation.short()
            ),
            rail: self.rail,
            amount: request.amount,
            currency: request.currency.clone(),
            settled_at: Utc::now(),
        })
    }
}

/// Simulated USDC transfer. Refuses destinations that are not an on-chain
/// address; standard and instant payouts settle alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoRail;

#[async_trait]
impl RailAdapter for CryptoRail {
    fn rail(&self) -> WithdrawalMethodKind {
        WithdrawalMethodKind::Crypto
    }

    async fn send(&self, request: &PayoutRequest) -> Result<PayoutReceipt> {
        if !is_valid_crypto_address(&request.provider_account) {
            return Err(PaysettleError::PayoutRejected {
                rail: WithdrawalMethodKind::Crypto.to_string(),
                reason: "destination is not a valid address".into(),
            });
        }
        Ok(PayoutReceipt {
            provider_ref: format!(
                "{}_{}",
                provider_prefix(WithdrawalMethodKind::Crypto),
                request.reservation.short()
            ),
            rail: WithdrawalMethodKind::Crypto,
            amount: request.amount,
            currency: request.currency.clone(),
            settled_at: Utc::now(),
        })
    }
}

/// Rail that rejects every payout; used for fault injection.
#[derive(Debug, Clone)]
pub struct FailingRail {
    rail: WithdrawalMethodKind,
    reason: String,
}

impl FailingRail {
    #[must_use]
    pub fn new(rail: WithdrawalMethodKind, reason: impl Into<String>) -> Self {
        Self {
            rail,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RailAdapter for FailingRail {
    fn rail(&self) -> WithdrawalMethodKind {
        self.rail
    }

    async fn send(&self, _request: &PayoutRequest) -> Result<PayoutReceipt> {
        Err(PaysettleError::PayoutRejected {
            rail: self.rail.to_string(),
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rail: WithdrawalMethodKind, instant: bool) -> PayoutRequest {
        PayoutRequest {
            reservation: TransactionId::new(),
            owner: OwnerId::new(),
            method: MethodId::new(),
            rail,
            provider_account: "acct".into(),
            amount: Decimal::new(4925, 2),
            currency: "BRL".into(),
            instant,
        }
    }

    #[tokio::test]
    async fn simulated_rail_mints_provider_ref() {
        let req = request(WithdrawalMethodKind::Pix, false);
        let receipt = SimulatedRail::new(WithdrawalMethodKind::Pix)
            .send(&req)
            .await
            .unwrap();
        assert_eq!(
            receipt.provider_ref,
            format!("PIX_S{}", req.reservation.short())
        );
        assert_eq!(receipt.amount, req.amount);
        assert_eq!(receipt.currency, "BRL");
    }

    #[tokio::test]
    async fn instant_payouts_are_tagged() {
        let req = request(WithdrawalMethodKind::Card, true);
        let receipt = SimulatedRail::new(WithdrawalMethodKind::Card)
            .send(&req)
            .await
            .unwrap();
        assert!(receipt.provider_ref.starts_with("CARD_I"));
    }

    #[tokio::test]
    async fn failing_rail_rejects() {
        let err = FailingRail::new(WithdrawalMethodKind::MPesa, "account closed")
            .send(&request(WithdrawalMethodKind::MPesa, false))
            .await
            .unwrap_err();
        assert!(matches!(err, PaysettleError::PayoutRejected { ref rail, .. } if rail == "MPESA"));
    }

    #[tokio::test]
    async fn crypto_rail_checks_the_address() {
        let mut req = request(WithdrawalMethodKind::Crypto, false);
        req.currency = "USD".into();
        let err = CryptoRail.send(&req).await.unwrap_err();
        assert!(matches!(err, PaysettleError::PayoutRejected { ref rail, .. } if rail == "CRYPTO"));

        req.provider_account = "0x52908400098527886E0F7030069857D2E4169EE7".into();
        let receipt = CryptoRail.send(&req).await.unwrap();
        assert_eq!(receipt.provider_ref, format!("USDC_{}", req.reservation.short()));
        assert_eq!(receipt.rail, WithdrawalMethodKind::Crypto);
        assert_eq!(receipt.currency, "USD");
    }

    #[test]
    fn every_rail_has_a_prefix() {
        for kind in WithdrawalMethodKind::ALL {
            assert!(!provider_prefix(kind).is_empty());
        }
    }
}
