//! The wallet ledger: single source of truth for balances.
//!
//! Every mutation runs inside an atomic unit ([`LedgerStore::atomic`]):
//!
//! 1. lock every touched wallet in ascending [`OwnerId`] order,
//! 2. let the caller mutate a staged copy through [`LedgerUnit`],
//! 3. commit all staged wallets together, or drop them all on error.
//!
//! Locks are `parking_lot` mutexes held only for the synchronous body of a
//! unit; callers perform any `.await` before or after, never inside.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use paysettle_types::{
    OwnerId, PaysettleError, Result, Transaction, TransactionId, TransactionStatus, TxDraft,
    Wallet, WalletSettings,
};
use rust_decimal::Decimal;

use crate::conservation::{FundsConservation, checked_sum};

/// A wallet together with its transaction history (oldest first).
#[derive(Debug, Clone)]
pub struct WalletRecord {
    pub wallet: Wallet,
    pub transactions: Vec<Transaction>,
}

impl WalletRecord {
    fn new(owner: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            wallet: Wallet::new(owner, now),
            transactions: Vec::new(),
        }
    }
}

type Cell = Arc<Mutex<WalletRecord>>;

/// In-memory wallet ledger.
#[derive(Debug, Default)]
pub struct LedgerStore {
    wallets: RwLock<HashMap<OwnerId, Cell>>,
    /// Transaction id → owning wallet.
    tx_index: RwLock<HashMap<TransactionId, OwnerId>>,
    conservation: Mutex<FundsConservation>,
}

impl LedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, owner: OwnerId, now: DateTime<Utc>) -> Cell {
        if let Some(cell) = self.wallets.read().get(&owner) {
            return Arc::clone(cell);
        }
        let mut wallets = self.wallets.write();
        Arc::clone(
            wallets
                .entry(owner)
                .or_insert_with(|| Arc::new(Mutex::new(WalletRecord::new(owner, now)))),
        )
    }

    fn existing_cell(&self, owner: OwnerId) -> Option<Cell> {
        self.wallets.read().get(&owner).map(Arc::clone)
    }

    fn all_cells(&self) -> Vec<Cell> {
        self.wallets.read().values().map(Arc::clone).collect()
    }

    /// Run `f` as one atomic unit over `owners`.
    ///
    /// Wallets are created on first touch and locked in ascending owner
    /// order, so two units over overlapping owner sets cannot deadlock.
    /// Staged changes commit only when `f` returns `Ok`.
    pub fn atomic<T, F>(&self, owners: &[OwnerId], now: DateTime<Utc>, f: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerUnit<'_>) -> Result<T>,
    {
        let mut ids = owners.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let cells: Vec<(OwnerId, Cell)> = ids.iter().map(|&o| (o, self.cell(o, now))).collect();
        let mut guards: Vec<_> = cells.iter().map(|(o, c)| (*o, c.lock())).collect();

        let (value, mut outcome) = {
            let base = guards.iter().map(|(o, g)| (*o, &**g)).collect();
            let mut unit = LedgerUnit::new(now, base);
            let value = f(&mut unit)?;
            (value, unit.into_outcome())
        };

        if !outcome.deposits.is_zero() || !outcome.payouts.is_zero() {
            let mut conservation = self.conservation.lock();
            let mut totals = conservation.clone();
            totals.record_deposit(outcome.deposits)?;
            totals.record_payout(outcome.payouts)?;
            *conservation = totals;
        }

        let mut new_ids = Vec::new();
        for (owner, guard) in &mut guards {
            if let Some(staged) = outcome.staged.remove(&*owner) {
                staged.apply(guard, now, &mut new_ids);
            }
        }

        if !new_ids.is_empty() {
            let mut index = self.tx_index.write();
            for (id, owner) in &new_ids {
                index.insert(*id, *owner);
            }
        }
        drop(guards);

        tracing::debug!(
            wallets = ids.len(),
            new_transactions = new_ids.len(),
            "ledger unit committed"
        );
        Ok(value)
    }

    /// Return the owner's wallet, creating it if absent, after clearing every
    /// matured pending credit in the same unit.
    pub fn get_or_create_wallet(&self, owner: OwnerId, now: DateTime<Utc>) -> Result<Wallet> {
        self.atomic(&[owner], now, |unit| {
            let cleared = unit.clear_matured(owner)?;
            if cleared > 0 {
                tracing::info!(owner = %owner, cleared, "pending credits cleared");
            }
            unit.wallet(owner).cloned()
        })
    }

    /// Single-wallet credit.
    pub fn credit(&self, owner: OwnerId, draft: TxDraft, now: DateTime<Utc>) -> Result<TransactionId> {
        self.atomic(&[owner], now, |unit| unit.credit(owner, draft))
    }

    /// Single-wallet debit. Fails without side effects when funds are short.
    pub fn debit(&self, owner: OwnerId, draft: TxDraft, now: DateTime<Utc>) -> Result<TransactionId> {
        self.atomic(&[owner], now, |unit| unit.debit(owner, draft))
    }

    /// Current wallet state without creating or clearing anything.
    #[must_use]
    pub fn wallet(&self, owner: OwnerId) -> Option<Wallet> {
        self.existing_cell(owner).map(|c| c.lock().wallet.clone())
    }

    /// Transaction history, newest first.
    #[must_use]
    pub fn history(&self, owner: OwnerId) -> Vec<Transaction> {
        self.existing_cell(owner)
            .map(|c| c.lock().transactions.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Transaction> {
        let owner = self
            .tx_index
            .read()
            .get(&id)
            .copied()
            .ok_or(PaysettleError::TransactionNotFound(id))?;
        let cell = self
            .existing_cell(owner)
            .ok_or(PaysettleError::TransactionNotFound(id))?;
        let record = cell.lock();
        record
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(PaysettleError::TransactionNotFound(id))
    }

    /// Every transaction in the ledger, in no particular order.
    #[must_use]
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.all_cells()
            .iter()
            .flat_map(|c| c.lock().transactions.clone())
            .collect()
    }

    /// Wallets with auto-withdrawal enabled.
    #[must_use]
    pub fn auto_withdrawal_candidates(&self) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = self
            .all_cells()
            .iter()
            .filter_map(|c| {
                let record = c.lock();
                record
                    .wallet
                    .settings
                    .auto_withdrawal
                    .enabled
                    .then(|| record.wallet.clone())
            })
            .collect();
        wallets.sort_by_key(|w| w.owner);
        wallets
    }

    /// Σ(available + pending) over every wallet, treasury included.
    #[must_use]
    pub fn total_custody(&self) -> Decimal {
        self.all_cells()
            .iter()
            .map(|c| c.lock().wallet.total())
            .fold(Decimal::ZERO, |acc, total| acc.saturating_add(total))
    }

    #[must_use]
    pub fn conservation(&self) -> FundsConservation {
        self.conservation.lock().clone()
    }

    /// Check custody plus `escrow_held` against deposits minus payouts.
    pub fn verify_conservation(&self, escrow_held: Decimal) -> Result<()> {
        let custody = self.total_custody();
        self.conservation.lock().verify(custody, escrow_held)
    }

    #[must_use]
    pub fn wallet_count(&self) -> usize {
        self.wallets.read().len()
    }
}

// ---------------------------------------------------------------------------
// LedgerUnit
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TxPatch {
    status: TransactionStatus,
    provider_ref: Option<String>,
}

#[derive(Debug)]
struct Staged {
    wallet: Wallet,
    appended: Vec<Transaction>,
    /// Status changes to committed transactions, by index.
    patches: HashMap<usize, TxPatch>,
    dirty: bool,
}

impl Staged {
    fn new(wallet: &Wallet) -> Self {
        Self {
            wallet: wallet.clone(),
            appended: Vec::new(),
            patches: HashMap::new(),
            dirty: false,
        }
    }

    fn apply(
        self,
        record: &mut WalletRecord,
        now: DateTime<Utc>,
        new_ids: &mut Vec<(TransactionId, OwnerId)>,
    ) {
        if !self.dirty {
            return;
        }
        record.wallet = self.wallet;
        record.wallet.updated_at = now;
        for (index, patch) in self.patches {
            if let Some(tx) = record.transactions.get_mut(index) {
                tx.status = patch.status;
                if patch.provider_ref.is_some() {
                    tx.provider_ref = patch.provider_ref;
                }
            }
        }
        for tx in self.appended {
            new_ids.push((tx.id, tx.owner));
            record.transactions.push(tx);
        }
    }
}

struct Outcome {
    staged: BTreeMap<OwnerId, Staged>,
    deposits: Decimal,
    payouts: Decimal,
}

enum TxLocation {
    Committed(usize),
    Appended(usize),
}

/// Staged view over the wallets locked by one atomic unit.
pub struct LedgerUnit<'a> {
    now: DateTime<Utc>,
    base: BTreeMap<OwnerId, &'a WalletRecord>,
    staged: BTreeMap<OwnerId, Staged>,
    deposits: Decimal,
    payouts: Decimal,
}

fn not_locked(owner: OwnerId) -> PaysettleError {
    PaysettleError::Internal(format!("{owner} is not part of this ledger unit"))
}

impl<'a> LedgerUnit<'a> {
    fn new(now: DateTime<Utc>, base: BTreeMap<OwnerId, &'a WalletRecord>) -> Self {
        Self {
            now,
            base,
            staged: BTreeMap::new(),
            deposits: Decimal::ZERO,
            payouts: Decimal::ZERO,
        }
    }

    fn into_outcome(self) -> Outcome {
        Outcome {
            staged: self.staged,
            deposits: self.deposits,
            payouts: self.payouts,
        }
    }

    fn record(&self, owner: OwnerId) -> Result<&'a WalletRecord> {
        self.base.get(&owner).copied().ok_or_else(|| not_locked(owner))
    }

    fn staged_mut(&mut self, owner: OwnerId) -> Result<&mut Staged> {
        let record = self.record(owner)?;
        let staged = self
            .staged
            .entry(owner)
            .or_insert_with(|| Staged::new(&record.wallet));
        staged.dirty = true;
        Ok(staged)
    }

    /// The instant this unit runs at.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Wallet state including changes staged so far.
    pub fn wallet(&self, owner: OwnerId) -> Result<&Wallet> {
        match self.staged.get(&owner) {
            Some(staged) => Ok(&staged.wallet),
            None => self.record(owner).map(|r| &r.wallet),
        }
    }

    fn locate(&self, owner: OwnerId, id: TransactionId) -> Result<TxLocation> {
        if let Some(pos) = self
            .staged
            .get(&owner)
            .and_then(|s| s.appended.iter().position(|t| t.id == id))
        {
            return Ok(TxLocation::Appended(pos));
        }
        self.record(owner)?
            .transactions
            .iter()
            .position(|t| t.id == id)
            .map(TxLocation::Committed)
            .ok_or(PaysettleError::TransactionNotFound(id))
    }

    /// A transaction of `owner` with staged status changes applied.
    pub fn transaction(&self, owner: OwnerId, id: TransactionId) -> Result<Transaction> {
        match self.locate(owner, id)? {
            TxLocation::Appended(pos) => self
                .staged
                .get(&owner)
                .and_then(|s| s.appended.get(pos))
                .cloned()
                .ok_or(PaysettleError::TransactionNotFound(id)),
            TxLocation::Committed(pos) => {
                let mut tx = self.record(owner)?.transactions[pos].clone();
                if let Some(patch) = self.staged.get(&owner).and_then(|s| s.patches.get(&pos)) {
                    tx.status = patch.status;
                    if patch.provider_ref.is_some() {
                        tx.provider_ref.clone_from(&patch.provider_ref);
                    }
                }
                Ok(tx)
            }
        }
    }

    fn set_status(
        &mut self,
        owner: OwnerId,
        id: TransactionId,
        status: TransactionStatus,
        provider_ref: Option<String>,
    ) -> Result<()> {
        let location = self.locate(owner, id)?;
        let staged = self.staged_mut(owner)?;
        match location {
            TxLocation::Appended(pos) => {
                let tx = &mut staged.appended[pos];
                tx.status = status;
                if provider_ref.is_some() {
                    tx.provider_ref = provider_ref;
                }
            }
            TxLocation::Committed(pos) => {
                staged.patches.insert(pos, TxPatch { status, provider_ref });
            }
        }
        Ok(())
    }

    fn append(&mut self, owner: OwnerId, draft: TxDraft) -> Result<TransactionId> {
        let now = self.now;
        let tx = draft.into_transaction(owner, now);
        let id = tx.id;
        self.staged_mut(owner)?.appended.push(tx);
        Ok(id)
    }

    /// Add `draft.amount` to the wallet. Drafts with a clearing date land in
    /// `pending`; everything else lands in `available`.
    pub fn credit(&mut self, owner: OwnerId, draft: TxDraft) -> Result<TransactionId> {
        if !draft.kind.is_credit() {
            return Err(PaysettleError::Internal(format!(
                "{} is not a credit kind",
                draft.kind
            )));
        }
        if draft.amount <= Decimal::ZERO {
            return Err(PaysettleError::invalid_amount(format!(
                "credit must be positive, got {}",
                draft.amount
            )));
        }
        let amount = draft.amount;
        let pending = draft.status == TransactionStatus::Pending;
        let wallet = &mut self.staged_mut(owner)?.wallet;
        if pending {
            wallet.pending = checked_sum(wallet.pending, amount)?;
        } else {
            wallet.available = checked_sum(wallet.available, amount)?;
        }
        self.append(owner, draft)
    }

    /// Subtract `draft.amount` from `available`.
    ///
    /// # Errors
    /// [`PaysettleError::InsufficientFunds`] when `available < amount`; the
    /// wallet is left unchanged.
    pub fn debit(&mut self, owner: OwnerId, draft: TxDraft) -> Result<TransactionId> {
        if draft.kind.is_credit() {
            return Err(PaysettleError::Internal(format!(
                "{} is not a debit kind",
                draft.kind
            )));
        }
        if draft.amount <= Decimal::ZERO {
            return Err(PaysettleError::invalid_amount(format!(
                "debit must be positive, got {}",
                draft.amount
            )));
        }
        let available = self.wallet(owner)?.available;
        if available < draft.amount {
            return Err(PaysettleError::InsufficientFunds {
                owner,
                needed: draft.amount,
                available,
            });
        }
        self.staged_mut(owner)?.wallet.available -= draft.amount;
        self.append(owner, draft)
    }

    /// Debit recorded as `Pending` while an outbound payout is in flight.
    pub fn reserve(&mut self, owner: OwnerId, draft: TxDraft) -> Result<TransactionId> {
        let mut draft = draft.status(TransactionStatus::Pending);
        draft.cleared_at = None;
        self.debit(owner, draft)
    }

    fn pending_reservation(&self, owner: OwnerId, id: TransactionId) -> Result<Transaction> {
        let tx = self.transaction(owner, id)?;
        if tx.kind.is_credit() || tx.status != TransactionStatus::Pending {
            return Err(PaysettleError::Internal(format!(
                "{id} is not an open reservation ({} {})",
                tx.kind, tx.status
            )));
        }
        Ok(tx)
    }

    /// Close a reservation after the rail confirmed the payout.
    pub fn finalize_reserved(
        &mut self,
        owner: OwnerId,
        id: TransactionId,
        status: TransactionStatus,
        provider_ref: String,
    ) -> Result<()> {
        if !status.is_settled() {
            return Err(PaysettleError::Internal(format!(
                "cannot finalize a reservation as {status}"
            )));
        }
        self.pending_reservation(owner, id)?;
        self.set_status(owner, id, status, Some(provider_ref))
    }

    /// Undo a reservation: restore the funds and mark it rejected.
    pub fn reverse_reserved(&mut self, owner: OwnerId, id: TransactionId) -> Result<()> {
        let tx = self.pending_reservation(owner, id)?;
        let wallet = &mut self.staged_mut(owner)?.wallet;
        wallet.available = checked_sum(wallet.available, tx.amount)?;
        self.set_status(owner, id, TransactionStatus::Rejected, None)
    }

    /// Move every matured pending credit into `available`. Idempotent.
    pub fn clear_matured(&mut self, owner: OwnerId) -> Result<usize> {
        let now = self.now;
        let record = self.record(owner)?;

        let already_patched = |staged: Option<&Staged>, index: usize| {
            staged.and_then(|s| s.patches.get(&index)).is_some()
        };
        let matured: Vec<usize> = record
            .transactions
            .iter()
            .enumerate()
            .filter(|(i, tx)| tx.is_matured(now) && !already_patched(self.staged.get(&owner), *i))
            .map(|(i, _)| i)
            .collect();
        let appended_matured = self
            .staged
            .get(&owner)
            .is_some_and(|s| s.appended.iter().any(|t| t.is_matured(now)));
        if matured.is_empty() && !appended_matured {
            return Ok(0);
        }

        let staged = self.staged_mut(owner)?;
        let mut moved = Decimal::ZERO;
        let mut cleared = 0;
        for index in matured {
            moved = checked_sum(moved, record.transactions[index].amount)?;
            staged.patches.insert(
                index,
                TxPatch {
                    status: TransactionStatus::Completed,
                    provider_ref: None,
                },
            );
            cleared += 1;
        }
        for tx in staged.appended.iter_mut().filter(|t| t.is_matured(now)) {
            moved = checked_sum(moved, tx.amount)?;
            tx.status = TransactionStatus::Completed;
            cleared += 1;
        }

        if staged.wallet.pending < moved {
            return Err(PaysettleError::BalanceUnderflow);
        }
        staged.wallet.available = checked_sum(staged.wallet.available, moved)?;
        staged.wallet.pending -= moved;
        Ok(cleared)
    }

    /// Edit the wallet's settings in place.
    pub fn update_settings(
        &mut self,
        owner: OwnerId,
        f: impl FnOnce(&mut WalletSettings) -> Result<()>,
    ) -> Result<WalletSettings> {
        let staged = self.staged_mut(owner)?;
        f(&mut staged.wallet.settings)?;
        Ok(staged.wallet.settings.clone())
    }

    /// Note money entering custody from outside (committed with the unit).
    pub fn record_deposit(&mut self, amount: Decimal) -> Result<()> {
        self.deposits = checked_sum(self.deposits, amount)?;
        Ok(())
    }

    /// Note money leaving custody through a payout rail.
    pub fn record_payout(&mut self, amount: Decimal) -> Result<()> {
        self.payouts = checked_sum(self.payouts, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use paysettle_types::TransactionKind;

    fn deposit(store: &LedgerStore, owner: OwnerId, amount: i64) {
        store
            .atomic(&[owner], Utc::now(), |unit| {
                unit.record_deposit(Decimal::new(amount, 0))?;
                unit.credit(owner, TxDraft::new(TransactionKind::Deposit, Decimal::new(amount, 0)))
            })
            .unwrap();
    }

    #[test]
    fn wallet_created_lazily() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        assert!(store.wallet(owner).is_none());
        let wallet = store.get_or_create_wallet(owner, Utc::now()).unwrap();
        assert!(wallet.is_zero());
        assert_eq!(store.wallet_count(), 1);
    }

    #[test]
    fn credit_then_debit() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        deposit(&store, owner, 1000);
        store
            .debit(owner, TxDraft::new(TransactionKind::PaymentOut, Decimal::new(400, 0)), Utc::now())
            .unwrap();
        let wallet = store.wallet(owner).unwrap();
        assert_eq!(wallet.available, Decimal::new(600, 0));
        assert_eq!(store.history(owner).len(), 2);
        assert_eq!(store.history(owner)[0].kind, TransactionKind::PaymentOut);
    }

    #[test]
    fn insufficient_funds_leaves_wallet_untouched() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        deposit(&store, owner, 50);
        let err = store
            .debit(owner, TxDraft::new(TransactionKind::PaymentOut, Decimal::new(100, 0)), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            PaysettleError::InsufficientFunds { needed, available, .. }
                if needed == Decimal::new(100, 0) && available == Decimal::new(50, 0)
        ));
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::new(50, 0));
        assert_eq!(store.history(owner).len(), 1);
    }

    #[test]
    fn multi_wallet_unit_commits_all_or_nothing() {
        let store = LedgerStore::new();
        let a = OwnerId::new();
        let b = OwnerId::new();
        deposit(&store, a, 100);

        let result = store.atomic(&[a, b], Utc::now(), |unit| {
            unit.credit(b, TxDraft::new(TransactionKind::PaymentIn, Decimal::new(80, 0)))?;
            unit.debit(a, TxDraft::new(TransactionKind::PaymentOut, Decimal::new(200, 0)))
        });
        assert!(result.is_err());
        assert_eq!(store.wallet(a).unwrap().available, Decimal::new(100, 0));
        assert_eq!(store.wallet(b).unwrap().available, Decimal::ZERO);
        assert!(store.history(b).is_empty());
    }

    #[test]
    fn touching_an_unlocked_wallet_is_an_error() {
        let store = LedgerStore::new();
        let a = OwnerId::new();
        let err = store
            .atomic(&[a], Utc::now(), |unit| {
                unit.credit(OwnerId::new(), TxDraft::new(TransactionKind::Deposit, Decimal::ONE))
            })
            .unwrap_err();
        assert!(matches!(err, PaysettleError::Internal(_)));
    }

    #[test]
    fn duplicate_owner_ids_are_deduplicated() {
        let store = LedgerStore::new();
        let a = OwnerId::new();
        store
            .atomic(&[a, a, a], Utc::now(), |unit| {
                unit.credit(a, TxDraft::new(TransactionKind::Deposit, Decimal::ONE))
            })
            .unwrap();
        assert_eq!(store.wallet(a).unwrap().available, Decimal::ONE);
    }

    #[test]
    fn lazy_clearing_is_idempotent() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        let now = Utc::now();
        store
            .credit(
                owner,
                TxDraft::new(TransactionKind::PaymentIn, Decimal::new(90, 0))
                    .clears_at(now + Duration::days(5)),
                now,
            )
            .unwrap();

        let before = store.get_or_create_wallet(owner, now + Duration::days(4)).unwrap();
        assert_eq!(before.pending, Decimal::new(90, 0));
        assert_eq!(before.available, Decimal::ZERO);

        let later = now + Duration::days(5);
        let after = store.get_or_create_wallet(owner, later).unwrap();
        assert_eq!(after.pending, Decimal::ZERO);
        assert_eq!(after.available, Decimal::new(90, 0));

        let again = store.get_or_create_wallet(owner, later + Duration::days(1)).unwrap();
        assert_eq!(again.available, Decimal::new(90, 0));
        assert_eq!(store.history(owner)[0].status, TransactionStatus::Completed);
    }

    #[test]
    fn reservation_finalize_keeps_funds_out() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        deposit(&store, owner, 500);
        let now = Utc::now();

        let id = store
            .atomic(&[owner], now, |unit| {
                unit.reserve(owner, TxDraft::new(TransactionKind::Withdrawal, Decimal::new(200, 0)))
            })
            .unwrap();
        assert_eq!(store.transaction(id).unwrap().status, TransactionStatus::Pending);
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::new(300, 0));

        store
            .atomic(&[owner], now, |unit| {
                unit.record_payout(Decimal::new(200, 0))?;
                unit.finalize_reserved(owner, id, TransactionStatus::Completed, "BANK_1".into())
            })
            .unwrap();
        let tx = store.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.provider_ref.as_deref(), Some("BANK_1"));
        assert!(store.verify_conservation(Decimal::ZERO).is_ok());
    }

    #[test]
    fn reservation_reverse_restores_funds() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        deposit(&store, owner, 500);
        let now = Utc::now();
        let id = store
            .atomic(&[owner], now, |unit| {
                unit.reserve(owner, TxDraft::new(TransactionKind::Withdrawal, Decimal::new(200, 0)))
            })
            .unwrap();
        store
            .atomic(&[owner], now, |unit| unit.reverse_reserved(owner, id))
            .unwrap();
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::new(500, 0));
        assert_eq!(store.transaction(id).unwrap().status, TransactionStatus::Rejected);

        // A reversed reservation cannot be reversed twice.
        assert!(store
            .atomic(&[owner], now, |unit| unit.reverse_reserved(owner, id))
            .is_err());
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::new(500, 0));
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let store = Arc::new(LedgerStore::new());
        let owner = OwnerId::new();
        deposit(&store, owner, 100);

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = Arc::clone(&store);
                    s.spawn(move || {
                        store
                            .debit(
                                owner,
                                TxDraft::new(TransactionKind::PaymentOut, Decimal::new(10, 0)),
                                Utc::now(),
                            )
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
        });

        assert_eq!(successes, 10);
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::ZERO);
    }

    #[test]
    fn conservation_tracks_deposits() {
        let store = LedgerStore::new();
        let a = OwnerId::new();
        let b = OwnerId::new();
        deposit(&store, a, 300);
        store
            .atomic(&[a, b], Utc::now(), |unit| {
                unit.debit(a, TxDraft::new(TransactionKind::PaymentOut, Decimal::new(100, 0)))?;
                unit.credit(b, TxDraft::new(TransactionKind::PaymentIn, Decimal::new(100, 0)))
            })
            .unwrap();
        assert_eq!(store.total_custody(), Decimal::new(300, 0));
        assert!(store.verify_conservation(Decimal::ZERO).is_ok());
        assert!(store.verify_conservation(Decimal::ONE).is_err());
    }

    #[test]
    fn settings_update_and_candidates() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        store
            .atomic(&[owner], Utc::now(), |unit| {
                unit.update_settings(owner, |s| {
                    s.auto_withdrawal.enabled = true;
                    s.preferred_currency = "EUR".into();
                    Ok(())
                })
            })
            .unwrap();
        let candidates = store.auto_withdrawal_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].settings.preferred_currency, "EUR");
    }

    #[test]
    fn unknown_transaction_lookup() {
        let store = LedgerStore::new();
        let err = store.transaction(TransactionId::new()).unwrap_err();
        assert!(matches!(err, PaysettleError::TransactionNotFound(_)));
    }

    #[test]
    fn overflowing_credit_fails_without_panicking() {
        let store = LedgerStore::new();
        let owner = OwnerId::new();
        store
            .credit(owner, TxDraft::new(TransactionKind::Deposit, Decimal::MAX), Utc::now())
            .unwrap();
        let err = store
            .credit(owner, TxDraft::new(TransactionKind::Deposit, Decimal::ONE), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PaysettleError::BalanceOverflow));
        assert_eq!(store.wallet(owner).unwrap().available, Decimal::MAX);
        assert_eq!(store.history(owner).len(), 1);
    }

    #[test]
    fn overflowing_deposit_total_rolls_back_the_unit() {
        let store = LedgerStore::new();
        let (a, b) = (OwnerId::new(), OwnerId::new());
        store
            .atomic(&[a], Utc::now(), |unit| {
                unit.record_deposit(Decimal::MAX)?;
                unit.credit(a, TxDraft::new(TransactionKind::Deposit, Decimal::MAX))
            })
            .unwrap();
        let err = store
            .atomic(&[b], Utc::now(), |unit| {
                unit.record_deposit(Decimal::ONE)?;
                unit.credit(b, TxDraft::new(TransactionKind::Deposit, Decimal::ONE))
            })
            .unwrap_err();
        assert!(matches!(err, PaysettleError::BalanceOverflow));
        assert_eq!(store.wallet(b).unwrap().available, Decimal::ZERO);
        assert_eq!(store.conservation().total_deposits(), Decimal::MAX);
    }
}
