//! Tax setting types.
//!
//! A [`TaxSetting`] is validated when it is constructed or deserialized, so
//! the tax engine can assume brackets are sorted and well formed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PaysettleError;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// One income band. Bounds are inclusive; `max: None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub min: Decimal,
    pub max: Option<Decimal>,
    /// Percent, `0..=100`.
    pub rate: Decimal,
}

impl TaxBracket {
    #[must_use]
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && self.max.is_none_or(|max| amount <= max)
    }
}

/// Withholding rule for one jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTaxSetting")]
pub struct TaxSetting {
    /// ISO country code, upper-case.
    pub jurisdiction: String,
    /// Percent applied when no bracket matches.
    pub flat_rate: Decimal,
    /// Sorted ascending by `min`, non-overlapping.
    pub brackets: Vec<TaxBracket>,
    pub is_active: bool,
}

/// Unvalidated wire form of [`TaxSetting`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaxSetting {
    pub jurisdiction: String,
    #[serde(default)]
    pub flat_rate: Decimal,
    #[serde(default)]
    pub brackets: Vec<TaxBracket>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl TryFrom<RawTaxSetting> for TaxSetting {
    type Error = PaysettleError;

    fn try_from(raw: RawTaxSetting) -> Result<Self, Self::Error> {
        Self::new(raw.jurisdiction, raw.flat_rate, raw.brackets, raw.is_active)
    }
}

fn invalid(reason: impl Into<String>) -> PaysettleError {
    PaysettleError::InvalidTaxSetting {
        reason: reason.into(),
    }
}

fn check_rate(rate: Decimal) -> Result<(), PaysettleError> {
    if rate < Decimal::ZERO || rate > HUNDRED {
        return Err(invalid(format!("rate {rate} outside 0..=100")));
    }
    Ok(())
}

impl TaxSetting {
    /// Build a validated setting.
    ///
    /// Brackets must be sorted by `min`, have `min <= max`, and must not
    /// overlap (a bracket may start exactly where the previous one ends).
    /// Only the last bracket may be unbounded.
    pub fn new(
        jurisdiction: impl Into<String>,
        flat_rate: Decimal,
        brackets: Vec<TaxBracket>,
        is_active: bool,
    ) -> Result<Self, PaysettleError> {
        let jurisdiction = jurisdiction.into().trim().to_ascii_uppercase();
        if jurisdiction.is_empty() {
            return Err(invalid("empty jurisdiction"));
        }
        check_rate(flat_rate)?;

        let mut previous_max: Option<Option<Decimal>> = None;
        for bracket in &brackets {
            check_rate(bracket.rate)?;
            if bracket.min < Decimal::ZERO {
                return Err(invalid(format!("negative bracket min {}", bracket.min)));
            }
            if bracket.max.is_some_and(|max| max < bracket.min) {
                return Err(invalid(format!("bracket min {} exceeds max", bracket.min)));
            }
            match previous_max {
                None => {}
                Some(None) => return Err(invalid("unbounded bracket must be last")),
                Some(Some(prev)) if bracket.min < prev => {
                    return Err(invalid(format!(
                        "bracket starting at {} overlaps previous ending at {prev}",
                        bracket.min
                    )));
                }
                Some(Some(_)) => {}
            }
            previous_max = Some(bracket.max);
        }

        Ok(Self {
            jurisdiction,
            flat_rate,
            brackets,
            is_active,
        })
    }

    /// Rate that applies to `amount`: first containing bracket, else flat.
    #[must_use]
    pub fn rate_for(&self, amount: Decimal) -> (Decimal, TaxBasis) {
        self.brackets
            .iter()
            .find(|b| b.contains(amount))
            .map_or((self.flat_rate, TaxBasis::Flat), |b| (b.rate, TaxBasis::Bracket))
    }
}

/// Where an assessed rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxBasis {
    /// Flat regulatory rate for unverified payees.
    BackupWithholding,
    Bracket,
    Flat,
    /// No active setting or lookup failed; nothing withheld.
    Exempt,
}

impl std::fmt::Display for TaxBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackupWithholding => write!(f, "BACKUP_WITHHOLDING"),
            Self::Bracket => write!(f, "BRACKET"),
            Self::Flat => write!(f, "FLAT"),
            Self::Exempt => write!(f, "EXEMPT"),
        }
    }
}

/// Result of a tax calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAssessment {
    pub tax_amount: Decimal,
    /// Percent applied.
    pub rate: Decimal,
    pub basis: TaxBasis,
}

impl TaxAssessment {
    #[must_use]
    pub fn exempt() -> Self {
        Self {
            tax_amount: Decimal::ZERO,
            rate: Decimal::ZERO,
            basis: TaxBasis::Exempt,
        }
    }
}
