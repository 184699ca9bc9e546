//! Funds conservation invariant checker.
//!
//! Invariant that must hold after every committed unit:
//! ```text
//! Σ(wallet available + pending) + Σ(active escrow) == Σ(deposits) - Σ(payouts)
//! ```
//!
//! Fees and withheld tax never leave the system; they move into the treasury
//! wallet, which is counted like any other wallet.

use paysettle_types::{PaysettleError, Result};
use rust_decimal::Decimal;

/// `a + b`, or `BalanceOverflow`.
pub fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b).ok_or(PaysettleError::BalanceOverflow)
}

/// Running totals of money entering and leaving custody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundsConservation {
    deposits: Decimal,
    payouts: Decimal,
}

impl FundsConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `BalanceOverflow` when the running total leaves the decimal range;
    /// the totals are unchanged.
    pub fn record_deposit(&mut self, amount: Decimal) -> Result<()> {
        self.deposits = checked_sum(self.deposits, amount)?;
        Ok(())
    }

    /// Record money that left custody through a payout rail.
    pub fn record_payout(&mut self, amount: Decimal) -> Result<()> {
        self.payouts = checked_sum(self.payouts, amount)?;
        Ok(())
    }

    /// Expected custody: deposits - payouts.
    #[must_use]
    pub fn expected_custody(&self) -> Decimal {
        self.deposits - self.payouts
    }

    /// Check actual wallet custody plus escrow against the running totals.
    pub fn verify(&self, wallet_custody: Decimal, escrow_held: Decimal) -> Result<()> {
        let actual = checked_sum(wallet_custody, escrow_held)?;
        let expected = self.expected_custody();
        if actual != expected {
            return Err(PaysettleError::ConservationViolation {
                reason: format!(
                    "wallets {wallet_custody} + escrow {escrow_held} = {actual} != expected {expected} \
                     (deposits={}, payouts={})",
                    self.deposits, self.payouts
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn total_deposits(&self) -> Decimal {
        self.deposits
    }

    #[must_use]
    pub fn total_payouts(&self) -> Decimal {
        self.payouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_custody_is_zero() {
        let fc = FundsConservation::new();
        assert_eq!(fc.expected_custody(), Decimal::ZERO);
        assert!(fc.verify(Decimal::ZERO, Decimal::ZERO).is_ok());
    }

    #[test]
    fn payouts_decrease_expected() {
        let mut fc = FundsConservation::new();
        fc.record_deposit(Decimal::new(1000, 0)).unwrap();
        fc.record_payout(Decimal::new(300, 0)).unwrap();
        assert_eq!(fc.expected_custody(), Decimal::new(700, 0));
    }

    #[test]
    fn escrow_counts_toward_custody() {
        let mut fc = FundsConservation::new();
        fc.record_deposit(Decimal::new(1000, 0)).unwrap();
        assert!(fc.verify(Decimal::new(600, 0), Decimal::new(400, 0)).is_ok());
    }

    #[test]
    fn verify_fails_when_imbalanced() {
        let mut fc = FundsConservation::new();
        fc.record_deposit(Decimal::new(10, 0)).unwrap();
        let err = fc.verify(Decimal::new(11, 0), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, PaysettleError::ConservationViolation { .. }));
    }

    #[test]
    fn overflowing_total_is_rejected_unchanged() {
        let mut fc = FundsConservation::new();
        fc.record_deposit(Decimal::MAX).unwrap();
        let err = fc.record_deposit(Decimal::ONE).unwrap_err();
        assert!(matches!(err, PaysettleError::BalanceOverflow));
        assert_eq!(fc.total_deposits(), Decimal::MAX);
    }
}
