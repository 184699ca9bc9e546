//! Decimal helpers shared by every money path.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::PaysettleError;
use crate::constants::{MAX_AMOUNT, MONEY_SCALE};

/// Round to cents, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate to cents. Used where rounding must favor the platform.
#[must_use]
pub fn truncate_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}

/// `amount × percent / 100`, rounded to cents.
#[must_use]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// Reject zero, negative, sub-cent, or over-limit amounts.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal, PaysettleError> {
    if amount <= Decimal::ZERO {
        return Err(PaysettleError::invalid_amount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(PaysettleError::invalid_amount(format!(
            "amount {amount} exceeds the limit of {MAX_AMOUNT}"
        )));
    }
    if amount.round_dp(MONEY_SCALE) != amount {
        return Err(PaysettleError::invalid_amount(format!(
            "amount {amount} has more than {MONEY_SCALE} decimal places"
        )));
    }
    Ok(amount)
}

/// Reject percentages outside `0..=100`.
pub fn ensure_percent(percent: Decimal) -> Result<Decimal, PaysettleError> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(PaysettleError::InvalidPercentage(percent));
    }
    Ok(percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_modes() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(truncate_money(Decimal::new(12349, 3)), Decimal::new(1234, 2));
        assert_eq!(truncate_money(Decimal::new(-12349, 3)), Decimal::new(-1234, 2));
    }

    #[test]
    fn percent_of_rounds() {
        assert_eq!(percent_of(Decimal::new(100, 0), Decimal::new(20, 0)), Decimal::new(20, 0));
        assert_eq!(percent_of(Decimal::new(3333, 2), Decimal::new(10, 0)), Decimal::new(333, 2));
    }

    #[test]
    fn positive_amounts() {
        assert!(ensure_positive(Decimal::new(1, 2)).is_ok());
        assert!(ensure_positive(Decimal::ZERO).is_err());
        assert!(ensure_positive(Decimal::new(-5, 0)).is_err());
        assert!(ensure_positive(Decimal::new(1, 3)).is_err());
        assert!(ensure_positive(MAX_AMOUNT).is_ok());
        assert!(ensure_positive(MAX_AMOUNT + Decimal::ONE).is_err());
        assert!(ensure_positive(Decimal::MAX).is_err());
        assert_eq!(MAX_AMOUNT, Decimal::new(1_000_000_000_000, 0));
    }

    #[test]
    fn percent_bounds() {
        assert!(ensure_percent(Decimal::ZERO).is_ok());
        assert!(ensure_percent(Decimal::ONE_HUNDRED).is_ok());
        let err = ensure_percent(Decimal::new(101, 0)).unwrap_err();
        assert!(matches!(err, PaysettleError::InvalidPercentage(_)));
    }
}
