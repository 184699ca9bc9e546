//! Withdrawal method types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MethodId, OwnerId, PaysettleError};

/// Payout rail a withdrawal method targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalMethodKind {
    Bank,
    Card,
    Momo,
    Pix,
    #[serde(rename = "PROMPTPAY")]
    PromptPay,
    #[serde(rename = "MPESA")]
    MPesa,
    Wise,
    Payoneer,
    /// USDC to an on-chain address kept in the wallet settings.
    Crypto,
}

impl WithdrawalMethodKind {
    pub const ALL: [Self; 9] = [
        Self::Bank,
        Self::Card,
        Self::Momo,
        Self::Pix,
        Self::PromptPay,
        Self::MPesa,
        Self::Wise,
        Self::Payoneer,
        Self::Crypto,
    ];

    /// Regional and cross-border rails settle in the payee's preferred
    /// currency; the rest pay out in the platform base.
    #[must_use]
    pub fn is_regional(&self) -> bool {
        matches!(
            self,
            Self::Momo | Self::Pix | Self::PromptPay | Self::MPesa | Self::Wise | Self::Payoneer
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "BANK",
            Self::Card => "CARD",
            Self::Momo => "MOMO",
            Self::Pix => "PIX",
            Self::PromptPay => "PROMPTPAY",
            Self::MPesa => "MPESA",
            Self::Wise => "WISE",
            Self::Payoneer => "PAYONEER",
            Self::Crypto => "CRYPTO",
        }
    }
}

impl std::fmt::Display for WithdrawalMethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalMethodKind {
    type Err = PaysettleError;

    /// Case-insensitive; `M-PESA` and `M_PESA` are accepted for M-Pesa.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', '_'], "");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| PaysettleError::UnsupportedMethodType(s.to_string()))
    }
}

/// Whether `address` looks like an on-chain address: 26 to 128 ASCII
/// alphanumerics, no whitespace.
#[must_use]
pub fn is_valid_crypto_address(address: &str) -> bool {
    (26..=128).contains(&address.len()) && address.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// A payout destination owned by a wallet owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalMethod {
    pub id: MethodId,
    pub owner: OwnerId,
    pub kind: WithdrawalMethodKind,
    /// At most one default per owner.
    pub is_default: bool,
    pub instant_capable: bool,
    /// Account identifier at the provider (IBAN, phone number, PIX key, ...).
    pub provider_account: String,
    pub provider_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWithdrawalMethod {
    pub kind: WithdrawalMethodKind,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub instant_capable: bool,
    pub provider_account: String,
    #[serde(default)]
    pub provider_label: Option<String>,
}
