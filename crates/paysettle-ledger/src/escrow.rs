//! Escrow book: funds held against contract milestones.
//!
//! Funding debits the client and creates an `Active` hold in one step.
//! Settling a hold (release or refund) runs the caller's ledger mutations and
//! flips the hold to its terminal state under the same lock, so a hold is
//! settled exactly once even when a manual release races the auto-release
//! job.
//!
//! Lock order is always escrow book → wallets.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use paysettle_types::{
    ContractId, EscrowHold, HoldId, HoldOutcome, HoldStatus, MilestoneId, OwnerId, PaysettleError,
    Result, TransactionKind, TxDraft,
};
use rust_decimal::Decimal;

use crate::store::{LedgerStore, LedgerUnit};

pub struct EscrowBook {
    ledger: Arc<LedgerStore>,
    holds: Mutex<HashMap<HoldId, EscrowHold>>,
}

fn find_hold(
    holds: &HashMap<HoldId, EscrowHold>,
    contract: ContractId,
    milestone: MilestoneId,
) -> Result<&EscrowHold> {
    let mut settled = false;
    for hold in holds.values() {
        if hold.contract == contract && hold.milestone == milestone {
            if hold.is_active() {
                return Ok(hold);
            }
            settled = true;
        }
    }
    if settled {
        Err(PaysettleError::HoldAlreadySettled)
    } else {
        Err(PaysettleError::HoldNotFound {
            contract,
            milestone,
        })
    }
}

impl EscrowBook {
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self {
            ledger,
            holds: Mutex::new(HashMap::new()),
        }
    }

    /// Debit `client` and open an active hold for the milestone.
    ///
    /// # Errors
    /// - `EscrowAlreadyFunded` if the milestone already has an active hold
    /// - `InsufficientFunds` if the client cannot cover `amount`
    pub fn fund(
        &self,
        contract: ContractId,
        milestone: MilestoneId,
        client: OwnerId,
        amount: Decimal,
        cost_center: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<EscrowHold> {
        let mut holds = self.holds.lock();
        if holds
            .values()
            .any(|h| h.contract == contract && h.milestone == milestone && h.is_active())
        {
            return Err(PaysettleError::EscrowAlreadyFunded);
        }

        self.ledger.atomic(&[client], now, |unit| {
            unit.debit(
                client,
                TxDraft::new(TransactionKind::EscrowFund, amount)
                    .reference(contract.0.to_string())
                    .cost_center(cost_center.clone())
                    .description(format!("Escrow funding for milestone {}", milestone.0)),
            )
        })?;

        let hold = EscrowHold {
            id: HoldId::new(),
            contract,
            milestone,
            client,
            amount,
            cost_center,
            status: HoldStatus::Active,
            payee: None,
            auto_release_at: None,
            created_at: now,
            settled_at: None,
        };
        holds.insert(hold.id, hold.clone());
        tracing::info!(
            hold = %hold.id,
            contract = %contract,
            client = %client,
            amount = %amount,
            "escrow funded"
        );
        Ok(hold)
    }

    /// Snapshot of the active hold for a milestone.
    pub fn active_hold(&self, contract: ContractId, milestone: MilestoneId) -> Result<EscrowHold> {
        find_hold(&self.holds.lock(), contract, milestone).cloned()
    }

    pub fn hold(&self, id: HoldId) -> Option<EscrowHold> {
        self.holds.lock().get(&id).cloned()
    }

    /// Record that `payee` submitted the milestone; it auto-releases at `auto_release_at`.
    pub fn mark_under_review(
        &self,
        contract: ContractId,
        milestone: MilestoneId,
        payee: OwnerId,
        auto_release_at: DateTime<Utc>,
    ) -> Result<EscrowHold> {
        let mut holds = self.holds.lock();
        let id = find_hold(&holds, contract, milestone)?.id;
        let hold = holds
            .get_mut(&id)
            .ok_or(PaysettleError::HoldNotFound {
                contract,
                milestone,
            })?;
        hold.payee = Some(payee);
        hold.auto_release_at = Some(auto_release_at);
        Ok(hold.clone())
    }

    /// Settle `hold_id` exactly once.
    ///
    /// `f` receives the hold and an atomic unit over `owners`; the hold moves
    /// to `outcome` only if `f` commits.
    pub fn settle<T, F>(
        &self,
        hold_id: HoldId,
        outcome: HoldOutcome,
        owners: &[OwnerId],
        now: DateTime<Utc>,
        f: F,
    ) -> Result<(EscrowHold, T)>
    where
        F: FnOnce(&EscrowHold, &mut LedgerUnit<'_>) -> Result<T>,
    {
        let mut holds = self.holds.lock();
        let hold = holds.get_mut(&hold_id).ok_or_else(|| {
            PaysettleError::Internal(format!("hold {hold_id} vanished from the escrow book"))
        })?;
        if hold.status.is_settled() {
            return Err(PaysettleError::HoldAlreadySettled);
        }

        let value = self.ledger.atomic(owners, now, |unit| f(hold, unit))?;

        hold.status = HoldStatus::from(outcome);
        hold.settled_at = Some(now);
        tracing::info!(
            hold = %hold.id,
            contract = %hold.contract,
            status = %hold.status,
            amount = %hold.amount,
            "escrow settled"
        );
        Ok((hold.clone(), value))
    }

    /// Active holds under review whose auto-release deadline has passed.
    #[must_use]
    pub fn due_for_auto_release(&self, now: DateTime<Utc>) -> Vec<EscrowHold> {
        let mut due: Vec<EscrowHold> = self
            .holds
            .lock()
            .values()
            .filter(|h| h.is_due_for_auto_release(now))
            .cloned()
            .collect();
        due.sort_by_key(|h| h.auto_release_at);
        due
    }

    /// Σ amount over active holds.
    #[must_use]
    pub fn total_held(&self) -> Decimal {
        self.holds
            .lock()
            .values()
            .filter(|h| h.is_active())
            .map(|h| h.amount)
            .sum()
    }

    #[must_use]
    pub fn holds_for_contract(&self, contract: ContractId) -> Vec<EscrowHold> {
        self.holds
            .lock()
            .values()
            .filter(|h| h.contract == contract)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup(balance: i64) -> (Arc<LedgerStore>, EscrowBook, OwnerId) {
        let ledger = Arc::new(LedgerStore::new());
        let client = OwnerId::new();
        ledger
            .atomic(&[client], Utc::now(), |unit| {
                unit.record_deposit(Decimal::new(balance, 0))?;
                unit.credit(client, TxDraft::new(TransactionKind::Deposit, Decimal::new(balance, 0)))
            })
            .unwrap();
        let book = EscrowBook::new(Arc::clone(&ledger));
        (ledger, book, client)
    }

    #[test]
    fn fund_debits_client_and_holds_amount() {
        let (ledger, book, client) = setup(1000);
        let hold = book
            .fund(ContractId::new(), MilestoneId::new(), client, Decimal::new(400, 0), None, Utc::now())
            .unwrap();
        assert_eq!(hold.status, HoldStatus::Active);
        assert_eq!(ledger.wallet(client).unwrap().available, Decimal::new(600, 0));
        assert_eq!(book.total_held(), Decimal::new(400, 0));
        assert!(ledger.verify_conservation(book.total_held()).is_ok());
    }

    #[test]
    fn fund_with_insufficient_funds_creates_no_hold() {
        let (ledger, book, client) = setup(100);
        let contract = ContractId::new();
        let milestone = MilestoneId::new();
        let err = book
            .fund(contract, milestone, client, Decimal::new(400, 0), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, PaysettleError::InsufficientFunds { .. }));
        assert!(matches!(
            book.active_hold(contract, milestone).unwrap_err(),
            PaysettleError::HoldNotFound { .. }
        ));
        assert_eq!(ledger.wallet(client).unwrap().available, Decimal::new(100, 0));
    }

    #[test]
    fn one_active_hold_per_milestone() {
        let (_ledger, book, client) = setup(1000);
        let contract = ContractId::new();
        let milestone = MilestoneId::new();
        book.fund(contract, milestone, client, Decimal::new(100, 0), None, Utc::now())
            .unwrap();
        let err = book
            .fund(contract, milestone, client, Decimal::new(100, 0), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, PaysettleError::EscrowAlreadyFunded));
    }

    #[test]
    fn settle_exactly_once() {
        let (ledger, book, client) = setup(1000);
        let payee = OwnerId::new();
        let contract = ContractId::new();
        let milestone = MilestoneId::new();
        let hold = book
            .fund(contract, milestone, client, Decimal::new(500, 0), None, Utc::now())
            .unwrap();

        let release = |h: &EscrowHold, unit: &mut LedgerUnit<'_>| {
            unit.credit(payee, TxDraft::new(TransactionKind::EscrowRelease, h.amount))
        };
        let (settled, _) = book
            .settle(hold.id, HoldOutcome::Released, &[payee], Utc::now(), release)
            .unwrap();
        assert_eq!(settled.status, HoldStatus::Released);
        assert!(settled.settled_at.is_some());

        let err = book
            .settle(hold.id, HoldOutcome::Released, &[payee], Utc::now(), release)
            .unwrap_err();
        assert!(matches!(err, PaysettleError::HoldAlreadySettled));
        assert!(matches!(
            book.active_hold(contract, milestone).unwrap_err(),
            PaysettleError::HoldAlreadySettled
        ));
        assert_eq!(ledger.wallet(payee).unwrap().available, Decimal::new(500, 0));
        assert!(ledger.verify_conservation(book.total_held()).is_ok());
    }

    #[test]
    fn failed_settlement_keeps_hold_active() {
        let (_ledger, book, client) = setup(1000);
        let hold = book
            .fund(ContractId::new(), MilestoneId::new(), client, Decimal::new(500, 0), None, Utc::now())
            .unwrap();
        let err = book
            .settle(hold.id, HoldOutcome::Released, &[client], Utc::now(), |_, _| {
                Err::<(), _>(PaysettleError::Internal("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, PaysettleError::Internal(_)));
        assert_eq!(book.hold(hold.id).unwrap().status, HoldStatus::Active);
    }

    #[test]
    fn auto_release_scan() {
        let (_ledger, book, client) = setup(1000);
        let now = Utc::now();
        let contract = ContractId::new();
        let milestone = MilestoneId::new();
        book.fund(contract, milestone, client, Decimal::new(100, 0), None, now)
            .unwrap();
        assert!(book.due_for_auto_release(now + Duration::days(30)).is_empty());

        book.mark_under_review(contract, milestone, OwnerId::new(), now + Duration::days(14))
            .unwrap();
        assert!(book.due_for_auto_release(now + Duration::days(13)).is_empty());
        assert_eq!(book.due_for_auto_release(now + Duration::days(14)).len(), 1);
    }
}
