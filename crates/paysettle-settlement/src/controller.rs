//! Escrow and settlement controller.
//!
//! Every operation follows the same shape:
//!
//! 1. Validate the request and read external collaborators (contract,
//!    profile, FX, tax). Each read is bounded by the upstream timeout.
//! 2. Apply all ledger effects in one atomic unit. Nothing is awaited while
//!    wallet locks are held.
//! 3. Notify the affected users. Delivery failures are logged only.
//!
//! Outbound payouts are the exception to step 2: the debit is reserved
//! first, the rail is called, and the reservation is finalized or reversed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use paysettle_ledger::{EscrowBook, IdempotencyGuard, LedgerStore, LedgerUnit, MethodBook};
use paysettle_payout::{PayoutDispatcher, PayoutOrder, RailRegistry};
use paysettle_rates::{CurrencyConverter, RateSource, TaxEngine, TaxSettingSource};
use paysettle_types::constants::IDEMPOTENCY_CAPACITY;
use paysettle_types::money::{ensure_percent, ensure_positive, percent_of, round_money};
use paysettle_types::{
    AutoWithdrawal, Clock, ContractId, ContractInfo, ContractStatus, CorrelationId, EscrowHold,
    HoldOutcome, MethodId, MilestoneId, NewWithdrawalMethod, OwnerId, PaysettleError, Result,
    SettlementConfig, TaxAssessment, Transaction, TransactionId, TransactionKind,
    TransactionStatus, TxDraft, UserProfile, WalletSettings, WithdrawalMethod,
    WithdrawalMethodKind, is_valid_crypto_address,
};
use rust_decimal::Decimal;

use crate::api::{
    BatchReport, DepositRequest, Invoice, KindMetrics, Metrics, ReleaseBreakdown,
    ReleaseOutcome, ReleaseRequest, SplitReleaseOutcome, SplitReleaseRequest, TransferOutcome,
    TransferRequest, WalletView, WithdrawRequest, WithdrawalOutcome,
};
use crate::payroll::PayrollBook;
use crate::ports::{ContractDirectory, Notification, NotificationKind, Notifier, UserDirectory};
use crate::subscription::SubscriptionBook;
use crate::timelog::TimeLogBook;

/// External collaborators the controller is wired to.
pub struct Ports {
    pub contracts: Arc<dyn ContractDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub rates: Arc<dyn RateSource>,
    pub tax_settings: Arc<dyn TaxSettingSource>,
    pub rails: RailRegistry,
}

pub struct SettlementController {
    pub(crate) config: SettlementConfig,
    pub(crate) clock: Arc<dyn Clock>,
    timeout: Duration,
    pub(crate) ledger: Arc<LedgerStore>,
    pub(crate) escrow: Arc<EscrowBook>,
    methods: Arc<MethodBook>,
    fx: Arc<CurrencyConverter>,
    pub(crate) tax: Arc<TaxEngine>,
    payouts: PayoutDispatcher,
    contracts: Arc<dyn ContractDirectory>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    deposits: Mutex<IdempotencyGuard<String>>,
    pub(crate) time_logs: TimeLogBook,
    pub(crate) payroll: PayrollBook,
    pub(crate) subscriptions: SubscriptionBook,
}

// ---------------------------------------------------------------------------
// Release planning
// ---------------------------------------------------------------------------

/// Divide `gross` between the payee and an optional agency.
///
/// The agency share is the exact `gross × percent / 100`, unrounded, and the
/// payee gets the remainder, so the two always sum to `gross`.
#[must_use]
pub fn split_revenue(
    gross: Decimal,
    agency: Option<(OwnerId, Decimal)>,
) -> (Option<(OwnerId, Decimal)>, Decimal) {
    match agency {
        Some((agency, percent)) => {
            let share = (gross * percent / Decimal::ONE_HUNDRED).min(gross);
            (Some((agency, share)), gross - share)
        }
        None => (None, gross),
    }
}

/// Ledger effects of paying `gross` to a payee: agency share, withheld tax,
/// and the net credit. Computed before the unit opens.
#[derive(Debug, Clone)]
pub(crate) struct ReleasePlan {
    payee: OwnerId,
    gross: Decimal,
    agency: Option<(OwnerId, Decimal)>,
    tax: TaxAssessment,
    net: Decimal,
    reference: String,
    cost_center: Option<String>,
}

impl ReleasePlan {
    pub(crate) fn owners(&self) -> Vec<OwnerId> {
        let mut owners = vec![self.payee, OwnerId::treasury()];
        if let Some((agency, _)) = self.agency {
            owners.push(agency);
        }
        owners
    }

    /// Credit agency, payee and treasury. Zero amounts are skipped.
    pub(crate) fn apply(
        &self,
        unit: &mut LedgerUnit<'_>,
        kind: TransactionKind,
        correlation: CorrelationId,
    ) -> Result<ReleaseBreakdown> {
        let mut transactions = Vec::new();
        let mut agency_share = Decimal::ZERO;

        if let Some((agency, share)) = self.agency {
            agency_share = share;
            if share > Decimal::ZERO {
                transactions.push(
                    unit.credit(
                        agency,
                        TxDraft::new(TransactionKind::AgencyRevenueShare, share)
                            .reference(self.reference.clone())
                            .correlation(correlation)
                            .cost_center(self.cost_center.clone())
                            .description("Agency revenue share"),
                    )?,
                );
            }
        }
        if self.net > Decimal::ZERO {
            transactions.push(
                unit.credit(
                    self.payee,
                    TxDraft::new(kind, self.net)
                        .tax(self.tax.tax_amount)
                        .reference(self.reference.clone())
                        .correlation(correlation)
                        .cost_center(self.cost_center.clone())
                        .description(format!("Payment for {}", self.reference)),
                )?,
            );
        }
        if self.tax.tax_amount > Decimal::ZERO {
            transactions.push(
                unit.credit(
                    OwnerId::treasury(),
                    TxDraft::new(TransactionKind::TaxWithholding, self.tax.tax_amount)
                        .reference(self.reference.clone())
                        .correlation(correlation)
                        .description(format!("Withholding for {}", self.payee)),
                )?,
            );
        }

        Ok(ReleaseBreakdown {
            payee: self.payee,
            gross: self.gross,
            agency: self.agency.map(|(agency, _)| agency),
            agency_share,
            tax: self.tax.tax_amount,
            net: self.net,
            transactions,
        })
    }
}

impl SettlementController {
    #[must_use]
    pub fn new(config: SettlementConfig, clock: Arc<dyn Clock>, ports: Ports) -> Self {
        let ledger = Arc::new(LedgerStore::new());
        let methods = Arc::new(MethodBook::new());
        let fx = Arc::new(CurrencyConverter::new(ports.rates, clock.clone(), &config));
        let tax = Arc::new(TaxEngine::new(ports.tax_settings, clock.clone(), &config));
        let payouts = PayoutDispatcher::new(methods.clone(), ports.rails, fx.clone(), &config);
        Self {
            timeout: config.upstream_timeout(),
            escrow: Arc::new(EscrowBook::new(ledger.clone())),
            ledger,
            methods,
            fx,
            tax,
            payouts,
            contracts: ports.contracts,
            users: ports.users,
            notifier: ports.notifier,
            deposits: Mutex::new(IdempotencyGuard::new(IDEMPOTENCY_CAPACITY)),
            time_logs: TimeLogBook::default(),
            payroll: PayrollBook::new(),
            subscriptions: SubscriptionBook::default(),
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    #[must_use]
    pub fn escrow(&self) -> &Arc<EscrowBook> {
        &self.escrow
    }

    #[must_use]
    pub fn fx(&self) -> &Arc<CurrencyConverter> {
        &self.fx
    }

    #[must_use]
    pub fn tax_engine(&self) -> &Arc<TaxEngine> {
        &self.tax
    }

    /// Check funds conservation over the whole ledger.
    pub fn verify_conservation(&self) -> Result<()> {
        self.ledger.verify_conservation(self.escrow.total_held())
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    async fn upstream<T>(&self, service: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PaysettleError::UpstreamTimeout {
                service: service.to_string(),
            })?
    }

    pub(crate) async fn contract(&self, id: ContractId) -> Result<ContractInfo> {
        self.upstream("contracts", self.contracts.contract(id)).await
    }

    pub(crate) async fn profile(&self, id: OwnerId) -> Result<UserProfile> {
        self.upstream("users", self.users.profile(id)).await
    }

    pub(crate) async fn contract_due_payroll(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<crate::ports::PayrollDue>> {
        self.upstream("contracts", self.contracts.eor_contracts_due(now))
            .await
    }

    pub(crate) async fn notify(
        &self,
        recipient: OwnerId,
        kind: NotificationKind,
        message: impl Into<String>,
    ) {
        let notification = Notification::new(recipient, kind, message);
        match tokio::time::timeout(self.timeout, self.notifier.notify(&notification)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(recipient = %recipient, kind = ?kind, error = %err, "notification failed");
            }
            Err(_) => {
                tracing::warn!(recipient = %recipient, kind = ?kind, "notification timed out");
            }
        }
    }

    /// Agency split and tax for paying `gross` to `payee` under `contract`.
    ///
    /// `agency` is the share to divert before tax; pass
    /// `contract.agency_split()` for a regular release. The payee's profile
    /// is required: a release never proceeds with an unknown tax status.
    pub(crate) async fn plan_release(
        &self,
        contract: &ContractInfo,
        agency: Option<(OwnerId, Decimal)>,
        payee: OwnerId,
        gross: Decimal,
        cost_center: Option<String>,
    ) -> Result<ReleasePlan> {
        let (agency, payee_share) = split_revenue(gross, agency);
        let tax = if payee_share > Decimal::ZERO {
            let profile = self.profile(payee).await?;
            self.tax
                .calculate_tax(payee_share, &profile.jurisdiction, profile.tax_verified)
                .await
        } else {
            TaxAssessment::exempt()
        };
        Ok(ReleasePlan {
            payee,
            gross,
            agency,
            net: payee_share - tax.tax_amount,
            tax,
            reference: contract.id.0.to_string(),
            cost_center,
        })
    }

    // -----------------------------------------------------------------------
    // Wallet operations
    // -----------------------------------------------------------------------

    /// Credit money entering the platform. A reference id is applied once.
    pub async fn deposit(&self, request: DepositRequest) -> Result<Transaction> {
        let amount = ensure_positive(request.amount)?;
        let owner = request.owner;
        let reference = request.reference_id.trim().to_string();
        if reference.is_empty() {
            return Err(PaysettleError::invalid_request("deposit reference is empty"));
        }
        if !self.deposits.lock().claim(reference.clone()) {
            return Err(PaysettleError::DuplicateReference(reference));
        }

        let result = self
            .ledger
            .atomic(&[owner], self.clock.now(), |unit| {
                unit.record_deposit(amount)?;
                unit.credit(
                    owner,
                    TxDraft::new(TransactionKind::Deposit, amount)
                        .reference(reference.clone())
                        .description("Wallet deposit"),
                )
            })
            .and_then(|id| self.ledger.transaction(id));
        let tx = match result {
            Ok(tx) => tx,
            Err(err) => {
                self.deposits.lock().release(&reference);
                return Err(err);
            }
        };

        tracing::info!(owner = %owner, amount = %amount, reference = %reference, "deposit credited");
        self.notify(owner, NotificationKind::DepositReceived, format!("Deposit of {amount} received"))
            .await;
        Ok(tx)
    }

    /// Pay out of the wallet through the owner's withdrawal method.
    ///
    /// Instant payouts debit `amount + max(amount × rate, minimum)` and
    /// require an instant-capable method. Crypto payouts debit `amount` plus
    /// the flat network fee and need a crypto address on file. A failed or
    /// timed-out payout restores the balance.
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawalOutcome> {
        let amount = ensure_positive(request.amount)?;
        let owner = request.owner;
        let method = self.methods.resolve(owner, request.method_id)?;
        let crypto = method.kind == WithdrawalMethodKind::Crypto;
        // Crypto has a single speed: the instant flag is ignored.
        let instant = request.instant && !crypto;
        if instant && !method.instant_capable {
            return Err(PaysettleError::InstantNotSupported);
        }

        let (kind, fee, settled_status) = if crypto {
            (
                TransactionKind::Withdrawal,
                self.config.fees.crypto_network_fee,
                TransactionStatus::Completed,
            )
        } else if instant {
            (
                TransactionKind::InstantPayout,
                round_money(self.config.fees.instant_fee(amount)),
                TransactionStatus::InstantProcessed,
            )
        } else {
            (
                TransactionKind::Withdrawal,
                Decimal::ZERO,
                TransactionStatus::Completed,
            )
        };
        let fee_label = if crypto { "Crypto network fee" } else { "Instant payout fee" };
        let total = amount + fee;

        let wallet = self.ledger.get_or_create_wallet(owner, self.clock.now())?;
        if crypto && wallet.settings.crypto_address.is_none() {
            return Err(PaysettleError::invalid_request("no crypto address on file"));
        }
        let mut draft = TxDraft::new(kind, total)
            .reference(method.id.0.to_string())
            .description(format!("Withdrawal to {}", method.kind));
        if fee > Decimal::ZERO {
            draft = draft.fee(fee);
        }
        let reservation = self
            .ledger
            .atomic(&[owner], self.clock.now(), |unit| unit.reserve(owner, draft))?;

        let order = PayoutOrder {
            reservation,
            owner,
            method: method.id,
            amount,
            preferred_currency: wallet.settings.preferred_currency,
            crypto_address: wallet.settings.crypto_address,
            instant,
        };
        let receipt = match self.payouts.payout(&order).await {
            Ok(receipt) => receipt,
            Err(err) => {
                let reversed = self.ledger.atomic(&[owner], self.clock.now(), |unit| {
                    unit.reverse_reserved(owner, reservation)
                });
                if let Err(reverse_err) = reversed {
                    tracing::error!(owner = %owner, tx = %reservation, error = %reverse_err, "failed to reverse payout reservation");
                }
                tracing::warn!(owner = %owner, amount = %amount, error = %err, "payout failed, reservation reversed");
                self.notify(owner, NotificationKind::WithdrawalFailed, format!("Withdrawal of {amount} failed"))
                    .await;
                return Err(err);
            }
        };

        let treasury = OwnerId::treasury();
        self.ledger
            .atomic(&[owner, treasury], self.clock.now(), |unit| {
                unit.finalize_reserved(owner, reservation, settled_status, receipt.provider_ref.clone())?;
                unit.record_payout(amount)?;
                if fee > Decimal::ZERO {
                    unit.credit(
                        treasury,
                        TxDraft::new(TransactionKind::PlatformFee, fee)
                            .reference(reservation.0.to_string())
                            .description(fee_label),
                    )?;
                }
                Ok(())
            })
            .inspect_err(|err| {
                tracing::error!(owner = %owner, tx = %reservation, provider_ref = %receipt.provider_ref, error = %err, "payout sent but reservation not finalized");
            })?;

        let transaction = self.ledger.transaction(reservation)?;
        tracing::info!(
            owner = %owner,
            amount = %amount,
            fee = %fee,
            rail = %method.kind,
            provider_ref = %receipt.provider_ref,
            "withdrawal completed"
        );
        self.notify(
            owner,
            NotificationKind::WithdrawalCompleted,
            format!("Withdrawal of {amount} sent via {}", method.kind),
        )
        .await;
        Ok(WithdrawalOutcome {
            transaction,
            fee,
            total_debited: total,
            provider_ref: receipt.provider_ref,
            payout_amount: receipt.amount,
            payout_currency: receipt.currency,
        })
    }

    /// Move funds between wallets. The platform fee is withheld and the
    /// recipient's credit clears after the clearing period.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let amount = ensure_positive(request.amount)?;
        let (from, to) = (request.from, request.to);
        if from == to {
            return Err(PaysettleError::invalid_request("cannot transfer to the same wallet"));
        }
        if from.is_treasury() || to.is_treasury() {
            return Err(PaysettleError::Unauthorized {
                reason: "the treasury wallet does not take part in transfers".into(),
            });
        }

        let fee = percent_of(amount, self.config.fees.platform_fee_percent);
        let net = amount - fee;
        let correlation = CorrelationId::new();
        let now = self.clock.now();
        let clears_at = now + self.config.clearing_period();
        let reference = request.reference_id.unwrap_or_else(|| correlation.0.to_string());
        let treasury = OwnerId::treasury();

        let (debit, credit) = self.ledger.atomic(&[from, to, treasury], now, |unit| {
            let debit = unit.debit(
                from,
                TxDraft::new(TransactionKind::PaymentOut, amount)
                    .fee(fee)
                    .reference(reference.clone())
                    .correlation(correlation)
                    .description(request.description.clone()),
            )?;
            let credit = unit.credit(
                to,
                TxDraft::new(TransactionKind::PaymentIn, net)
                    .fee(fee)
                    .reference(reference.clone())
                    .correlation(correlation)
                    .description(request.description.clone())
                    .clears_at(clears_at),
            )?;
            if fee > Decimal::ZERO {
                unit.credit(
                    treasury,
                    TxDraft::new(TransactionKind::PlatformFee, fee)
                        .reference(reference.clone())
                        .correlation(correlation)
                        .description("Transfer fee"),
                )?;
            }
            Ok((debit, credit))
        })?;

        tracing::info!(from = %from, to = %to, amount = %amount, fee = %fee, correlation = %correlation, "transfer booked");
        self.notify(to, NotificationKind::PaymentReceived, format!("Payment of {net} pending clearing"))
            .await;
        Ok(TransferOutcome {
            correlation_id: correlation,
            debit,
            credit,
            fee,
            net,
            clears_at,
        })
    }

    // -----------------------------------------------------------------------
    // Escrow
    // -----------------------------------------------------------------------

    /// Debit the contract's client into an escrow hold for `milestone`.
    pub async fn fund_escrow(
        &self,
        contract: ContractId,
        milestone: MilestoneId,
        client: OwnerId,
        amount: Decimal,
        cost_center: Option<String>,
    ) -> Result<EscrowHold> {
        let amount = ensure_positive(amount)?;
        let info = self.contract(contract).await?;
        if info.client_id != client {
            return Err(PaysettleError::NotAParticipant(client));
        }
        if info.status != ContractStatus::Active {
            return Err(PaysettleError::ContractNotActive {
                reason: format!("contract is {}", info.status),
            });
        }
        let hold = self
            .escrow
            .fund(contract, milestone, client, amount, cost_center, self.clock.now())?;
        self.notify(info.freelancer_id, NotificationKind::EscrowFunded, format!("Milestone funded with {amount}"))
            .await;
        Ok(hold)
    }

    /// The freelancer submitted the milestone; it auto-releases after the
    /// review window unless the client acts first.
    pub async fn submit_for_review(
        &self,
        contract: ContractId,
        milestone: MilestoneId,
        freelancer: OwnerId,
    ) -> Result<EscrowHold> {
        let info = self.contract(contract).await?;
        if info.freelancer_id != freelancer {
            return Err(PaysettleError::NotAParticipant(freelancer));
        }
        let deadline = self.clock.now() + chrono::Duration::days(self.config.disputes.auto_release_days);
        let hold = self
            .escrow
            .mark_under_review(contract, milestone, freelancer, deadline)?;
        self.notify(info.client_id, NotificationKind::EscrowSubmitted, format!("Milestone submitted, auto-release at {deadline}"))
            .await;
        Ok(hold)
    }

    /// Release a milestone's hold to the payee, net of agency share and tax.
    ///
    /// # Errors
    /// - `HoldNotFound` / `HoldAlreadySettled`
    /// - `ContractNotActive` while the contract is disputed
    /// - `NotAParticipant` when `payee` is not the contract's freelancer
    /// - `UserNotFound` or upstream errors from the profile lookup
    pub async fn release_escrow(&self, request: ReleaseRequest) -> Result<ReleaseOutcome> {
        let hold = self.escrow.active_hold(request.contract, request.milestone)?;
        let info = self.contract(request.contract).await?;
        if info.status == ContractStatus::Disputed {
            return Err(PaysettleError::ContractNotActive {
                reason: "contract is under dispute".into(),
            });
        }
        if info.freelancer_id != request.payee {
            return Err(PaysettleError::NotAParticipant(request.payee));
        }

        let plan = self
            .plan_release(
                &info,
                info.agency_split(),
                request.payee,
                hold.amount,
                hold.cost_center.clone(),
            )
            .await?;
        let correlation = CorrelationId::new();
        let (hold, breakdown) = self.escrow.settle(
            hold.id,
            HoldOutcome::Released,
            &plan.owners(),
            self.clock.now(),
            |_, unit| plan.apply(unit, TransactionKind::EscrowRelease, correlation),
        )?;

        tracing::info!(
            contract = %request.contract,
            payee = %request.payee,
            gross = %breakdown.gross,
            agency_share = %breakdown.agency_share,
            tax = %breakdown.tax,
            net = %breakdown.net,
            "escrow released"
        );
        self.notify(request.payee, NotificationKind::EscrowReleased, format!("Milestone payment of {} released", breakdown.net))
            .await;
        if let Some(agency) = breakdown.agency {
            self.notify(agency, NotificationKind::EscrowReleased, format!("Revenue share of {} received", breakdown.agency_share))
                .await;
        }
        Ok(ReleaseOutcome { hold, breakdown })
    }

    /// Return a milestone's hold to the client.
    pub async fn refund_escrow(
        &self,
        contract: ContractId,
        milestone: MilestoneId,
    ) -> Result<EscrowHold> {
        let hold = self.escrow.active_hold(contract, milestone)?;
        let client = hold.client;
        let (hold, ()) = self.escrow.settle(
            hold.id,
            HoldOutcome::Refunded,
            &[client],
            self.clock.now(),
            |hold, unit| {
                unit.credit(
                    client,
                    TxDraft::new(TransactionKind::EscrowRefund, hold.amount)
                        .reference(contract.0.to_string())
                        .cost_center(hold.cost_center.clone())
                        .description("Escrow refund"),
                )?;
                Ok(())
            },
        )?;
        self.notify(client, NotificationKind::EscrowRefunded, format!("Escrow of {} refunded", hold.amount))
            .await;
        Ok(hold)
    }

    /// Release `freelancer_percentage` of a hold to the freelancer (taxed)
    /// and refund the remainder to the client, in one unit.
    ///
    /// The percentage replaces the contract's agency split: no agency share
    /// is taken from a split release.
    pub async fn split_release(&self, request: SplitReleaseRequest) -> Result<SplitReleaseOutcome> {
        let percent = ensure_percent(request.freelancer_percentage)?;
        let hold = self.escrow.active_hold(request.contract, request.milestone)?;
        let info = self.contract(request.contract).await?;
        if info.freelancer_id != request.freelancer {
            return Err(PaysettleError::NotAParticipant(request.freelancer));
        }

        let freelancer_gross = percent_of(hold.amount, percent);
        let client_refund = hold.amount - freelancer_gross;
        let plan = self
            .plan_release(&info, None, request.freelancer, freelancer_gross, hold.cost_center.clone())
            .await?;
        let mut owners = plan.owners();
        owners.push(hold.client);
        let outcome = if freelancer_gross > Decimal::ZERO {
            HoldOutcome::Released
        } else {
            HoldOutcome::Refunded
        };

        let correlation = CorrelationId::new();
        let (hold, breakdown) =
            self.escrow
                .settle(hold.id, outcome, &owners, self.clock.now(), |hold, unit| {
                    let breakdown = plan.apply(unit, TransactionKind::EscrowRelease, correlation)?;
                    if client_refund > Decimal::ZERO {
                        unit.credit(
                            hold.client,
                            TxDraft::new(TransactionKind::EscrowRefund, client_refund)
                                .reference(hold.contract.0.to_string())
                                .correlation(correlation)
                                .cost_center(hold.cost_center.clone())
                                .description("Partial escrow refund"),
                        )?;
                    }
                    Ok(breakdown)
                })?;

        tracing::info!(
            contract = %request.contract,
            percent = %percent,
            freelancer_gross = %freelancer_gross,
            client_refund = %client_refund,
            "escrow split"
        );
        self.notify(request.freelancer, NotificationKind::EscrowReleased, format!("Split payment of {} released", breakdown.net))
            .await;
        if client_refund > Decimal::ZERO {
            self.notify(hold.client, NotificationKind::EscrowRefunded, format!("Escrow of {client_refund} refunded"))
                .await;
        }
        Ok(SplitReleaseOutcome {
            hold,
            freelancer: breakdown,
            client_refund,
        })
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Wallet after lazy clearing, with balances in the preferred currency.
    pub async fn wallet_view(&self, owner: OwnerId) -> Result<WalletView> {
        let wallet = self.ledger.get_or_create_wallet(owner, self.clock.now())?;
        let base = self.fx.base_currency().to_string();
        let currency = wallet.settings.preferred_currency.clone();
        let local_available = self.fx.convert(wallet.available, &base, &currency).await?;
        let local_pending = self.fx.convert(wallet.pending, &base, &currency).await?;
        Ok(WalletView {
            transactions: self.ledger.history(owner),
            wallet,
            local_currency: currency,
            local_available,
            local_pending,
        })
    }

    pub fn invoice(&self, owner: OwnerId, id: TransactionId) -> Result<Invoice> {
        let tx = self.ledger.transaction(id)?;
        if tx.owner != owner {
            return Err(PaysettleError::NotAParticipant(owner));
        }
        Ok(Invoice {
            number: format!("INV-{}", tx.id.short()),
            transaction_id: tx.id,
            owner: tx.owner,
            kind: tx.kind,
            status: tx.status,
            amount: tx.amount,
            fee_amount: tx.fee_amount.unwrap_or_default(),
            tax_amount: tx.tax_amount.unwrap_or_default(),
            description: tx.description,
            created_at: tx.created_at,
            issued_at: self.clock.now(),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics {
            escrow_held: self.escrow.total_held(),
            wallet_count: self.ledger.wallet_count(),
            ..Metrics::default()
        };
        for tx in self
            .ledger
            .all_transactions()
            .into_iter()
            .filter(|t| t.status.is_settled())
        {
            metrics.settled_count += 1;
            metrics.settled_volume += tx.amount;
            let entry = metrics.by_kind.entry(tx.kind).or_default();
            entry.count += 1;
            entry.volume += tx.amount;
            match tx.kind {
                TransactionKind::PlatformFee => metrics.fees_collected += tx.amount,
                TransactionKind::TaxWithholding => metrics.tax_withheld += tx.amount,
                _ => {}
            }
        }
        metrics
    }

    // -----------------------------------------------------------------------
    // Withdrawal methods and wallet settings
    // -----------------------------------------------------------------------

    pub fn add_method(&self, owner: OwnerId, method: NewWithdrawalMethod) -> Result<WithdrawalMethod> {
        self.methods.add(owner, method, self.clock.now())
    }

    pub fn set_default_method(&self, owner: OwnerId, id: MethodId) -> Result<WithdrawalMethod> {
        self.methods.set_default(owner, id)
    }

    /// Delete a method. An auto-withdrawal targeting it falls back to the
    /// default method.
    pub fn delete_method(&self, owner: OwnerId, id: MethodId) -> Result<WithdrawalMethod> {
        let removed = self.methods.delete(owner, id)?;
        let targeted = self
            .ledger
            .wallet(owner)
            .is_some_and(|w| w.settings.auto_withdrawal.method_id == Some(id));
        if targeted {
            self.ledger.atomic(&[owner], self.clock.now(), |unit| {
                unit.update_settings(owner, |settings| {
                    settings.auto_withdrawal.method_id = None;
                    Ok(())
                })
            })?;
        }
        Ok(removed)
    }

    pub fn set_instant_capable(
        &self,
        owner: OwnerId,
        id: MethodId,
        instant_capable: bool,
    ) -> Result<WithdrawalMethod> {
        self.methods.mark_instant_capable(owner, id, instant_capable)
    }

    #[must_use]
    pub fn methods(&self, owner: OwnerId) -> Vec<WithdrawalMethod> {
        self.methods.list(owner)
    }

    pub fn configure_auto_withdrawal(
        &self,
        owner: OwnerId,
        auto_withdrawal: AutoWithdrawal,
    ) -> Result<WalletSettings> {
        if auto_withdrawal.threshold < Decimal::ZERO {
            return Err(PaysettleError::invalid_amount("threshold must not be negative"));
        }
        match auto_withdrawal.method_id {
            Some(id) => {
                self.methods.get_owned(owner, id)?;
            }
            None if auto_withdrawal.enabled => {
                self.methods
                    .default_for(owner)
                    .ok_or(PaysettleError::NoDefaultMethod)?;
            }
            None => {}
        }
        self.ledger.atomic(&[owner], self.clock.now(), |unit| {
            unit.update_settings(owner, |settings| {
                settings.auto_withdrawal = auto_withdrawal;
                Ok(())
            })
        })
    }

    /// Set the on-chain address `CRYPTO` withdrawals pay to.
    pub fn update_crypto_address(&self, owner: OwnerId, address: &str) -> Result<WalletSettings> {
        let address = address.trim();
        if !is_valid_crypto_address(address) {
            return Err(PaysettleError::invalid_request(format!(
                "malformed crypto address {address:?}"
            )));
        }
        let settings = self.ledger.atomic(&[owner], self.clock.now(), |unit| {
            unit.update_settings(owner, |settings| {
                settings.crypto_address = Some(address.to_string());
                Ok(())
            })
        })?;
        tracing::info!(owner = %owner, "crypto address updated");
        Ok(settings)
    }

    /// Set the display and regional payout currency.
    pub async fn set_preferred_currency(&self, owner: OwnerId, currency: &str) -> Result<WalletSettings> {
        let code = currency.trim().to_ascii_uppercase();
        let rates = self.fx.get_rates(self.fx.base_currency()).await?;
        if !rates.contains_key(&code) {
            return Err(PaysettleError::UnknownCurrency(code));
        }
        self.ledger.atomic(&[owner], self.clock.now(), |unit| {
            unit.update_settings(owner, |settings| {
                settings.preferred_currency = code;
                Ok(())
            })
        })
    }

    // -----------------------------------------------------------------------
    // Scheduled sweeps
    // -----------------------------------------------------------------------

    /// Release every hold whose review window has passed.
    pub async fn run_auto_release(&self) -> BatchReport {
        let mut report = BatchReport::default();
        for hold in self.escrow.due_for_auto_release(self.clock.now()) {
            let Some(payee) = hold.payee else {
                report.skipped += 1;
                continue;
            };
            let request = ReleaseRequest {
                contract: hold.contract,
                milestone: hold.milestone,
                payee,
            };
            match self.release_escrow(request).await {
                Ok(_) => report.processed += 1,
                Err(PaysettleError::HoldAlreadySettled | PaysettleError::ContractNotActive { .. }) => {
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(hold = %hold.id, contract = %hold.contract, error = %err, "auto-release failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Sweep the full available balance of every wallet whose auto-withdrawal
    /// is enabled, over threshold and due today.
    pub async fn run_auto_withdrawals(&self) -> BatchReport {
        let now = self.clock.now();
        let mut report = BatchReport::default();
        for wallet in self.ledger.auto_withdrawal_candidates() {
            let settings = &wallet.settings.auto_withdrawal;
            if !settings.should_sweep(wallet.available, now) {
                report.skipped += 1;
                continue;
            }
            // A crypto sweep leaves room for the network fee.
            let fee = match self.methods.resolve(wallet.owner, settings.method_id) {
                Ok(method) if method.kind == WithdrawalMethodKind::Crypto => {
                    self.config.fees.crypto_network_fee
                }
                _ => Decimal::ZERO,
            };
            let amount = wallet.available - fee;
            if amount <= Decimal::ZERO {
                report.skipped += 1;
                continue;
            }
            let request = WithdrawRequest {
                owner: wallet.owner,
                amount,
                instant: false,
                method_id: settings.method_id,
            };
            match self.withdraw(request).await {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    tracing::warn!(owner = %wallet.owner, amount = %amount, error = %err, "auto-withdrawal failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revenue_split_is_exact() {
        let agency = OwnerId::new();
        let (share, payee) = split_revenue(Decimal::new(100, 0), Some((agency, Decimal::new(20, 0))));
        assert_eq!(share, Some((agency, Decimal::new(20, 0))));
        assert_eq!(payee, Decimal::new(80, 0));

        let (share, payee) = split_revenue(Decimal::new(3333, 2), Some((agency, Decimal::new(15, 0))));
        let (_, agency_share) = share.unwrap();
        assert_eq!(agency_share, Decimal::new(49995, 4));
        assert_eq!(payee, Decimal::new(283305, 4));
        assert_eq!(agency_share + payee, Decimal::new(3333, 2));
    }

    #[test]
    fn no_agency_keeps_everything() {
        let (share, payee) = split_revenue(Decimal::new(100, 0), None);
        assert!(share.is_none());
        assert_eq!(payee, Decimal::new(100, 0));
    }
}
