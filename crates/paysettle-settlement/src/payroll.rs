//! Employer-of-record payroll.
//!
//! For each `(contract, period)` exactly once:
//!
//! ```text
//! employee  += gross − tax − benefits          (PAYROLL_RECEIPT)
//! client    −= gross + gross × employer_fee%   (PAYROLL_CHARGE)
//! treasury  += tax + benefits + employer_fee
//! ```
//!
//! Benefits are the active plans' monthly costs apportioned over the
//! period's inclusive day count.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use paysettle_ledger::IdempotencyGuard;
use paysettle_types::constants::IDEMPOTENCY_CAPACITY;
use paysettle_types::money::{ensure_positive, percent_of};
use paysettle_types::{
    BenefitPlan, BenefitPlanId, ContractId, ContractKind, ContractStatus, CorrelationId, OwnerId,
    PayrollId, PayrollPeriod, PayrollRecord, PaysettleError, Result, TransactionKind, TxDraft,
};
use rust_decimal::Decimal;

use crate::api::{BatchReport, PayrollRequest};
use crate::controller::SettlementController;
use crate::ports::NotificationKind;

pub(crate) struct PayrollBook {
    plans: RwLock<HashMap<BenefitPlanId, BenefitPlan>>,
    runs: Mutex<IdempotencyGuard<(ContractId, PayrollPeriod)>>,
    records: RwLock<Vec<PayrollRecord>>,
}

impl PayrollBook {
    pub(crate) fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
            runs: Mutex::new(IdempotencyGuard::new(IDEMPOTENCY_CAPACITY)),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Σ active plan costs apportioned over `period`.
    fn benefits_for(&self, period: &PayrollPeriod) -> Decimal {
        self.plans
            .read()
            .values()
            .filter(|p| p.is_active)
            .map(|p| period.apportion(p.monthly_cost))
            .sum()
    }
}

impl SettlementController {
    pub fn add_benefit_plan(&self, name: &str, monthly_cost: Decimal) -> Result<BenefitPlan> {
        if monthly_cost < Decimal::ZERO {
            return Err(PaysettleError::invalid_amount("benefit cost must not be negative"));
        }
        let plan = BenefitPlan {
            id: BenefitPlanId::new(),
            name: name.to_string(),
            monthly_cost,
            is_active: true,
        };
        self.payroll.plans.write().insert(plan.id, plan.clone());
        Ok(plan)
    }

    pub fn set_benefit_plan_active(&self, id: BenefitPlanId, active: bool) -> Result<BenefitPlan> {
        let mut plans = self.payroll.plans.write();
        let plan = plans
            .get_mut(&id)
            .ok_or_else(|| PaysettleError::invalid_request(format!("unknown benefit plan {id}")))?;
        plan.is_active = active;
        Ok(plan.clone())
    }

    #[must_use]
    pub fn benefit_plans(&self) -> Vec<BenefitPlan> {
        let mut plans: Vec<_> = self.payroll.plans.read().values().cloned().collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        plans
    }

    /// Run payroll for one EOR contract and period.
    ///
    /// # Errors
    /// - `ContractKindMismatch` for non-EOR contracts
    /// - `PayrollAlreadyProcessed` when the period was already paid
    /// - `InsufficientFunds` when the client cannot cover gross plus fee
    pub async fn process_payroll(
        &self,
        contract: ContractId,
        request: PayrollRequest,
    ) -> Result<PayrollRecord> {
        let gross = ensure_positive(request.gross)?;
        let period = PayrollPeriod::new(request.period_start, request.period_end)?;
        let info = self.contract(contract).await?;
        if info.kind != ContractKind::Eor {
            return Err(PaysettleError::ContractKindMismatch {
                expected: ContractKind::Eor.to_string(),
            });
        }
        if info.status != ContractStatus::Active {
            return Err(PaysettleError::ContractNotActive {
                reason: format!("contract is {}", info.status),
            });
        }
        if info.freelancer_id != request.employee {
            return Err(PaysettleError::NotAParticipant(request.employee));
        }
        if self.payroll.runs.lock().is_claimed(&(contract, period)) {
            return Err(PaysettleError::PayrollAlreadyProcessed);
        }

        let profile = self.profile(request.employee).await?;
        let tax = self
            .tax
            .calculate_tax(gross, &profile.jurisdiction, profile.tax_verified)
            .await
            .tax_amount;
        let benefits = self.payroll.benefits_for(&period);
        let fee_percent = info
            .employer_fee_percent
            .unwrap_or(self.config.fees.default_employer_fee_percent);
        let employer_fee = percent_of(gross, fee_percent);
        let net = gross - tax - benefits;
        if net <= Decimal::ZERO {
            return Err(PaysettleError::invalid_amount(format!(
                "deductions ({tax} tax, {benefits} benefits) exceed gross {gross}"
            )));
        }

        if !self.payroll.runs.lock().claim((contract, period)) {
            return Err(PaysettleError::PayrollAlreadyProcessed);
        }

        let client = info.client_id;
        let employee = request.employee;
        let treasury = OwnerId::treasury();
        let reference = format!("{}:{period}", contract.0);
        let correlation = CorrelationId::new();
        let now = self.clock.now();

        let result = self.ledger.atomic(&[client, employee, treasury], now, |unit| {
            unit.debit(
                client,
                TxDraft::new(TransactionKind::PayrollCharge, gross + employer_fee)
                    .fee(employer_fee)
                    .reference(reference.clone())
                    .correlation(correlation)
                    .description(format!("Payroll {period}")),
            )?;
            unit.credit(
                employee,
                TxDraft::new(TransactionKind::PayrollReceipt, net)
                    .tax(tax)
                    .reference(reference.clone())
                    .correlation(correlation)
                    .description(format!("Salary {period}")),
            )?;
            let treasury_entries = [
                (TransactionKind::TaxWithholding, tax),
                (TransactionKind::BenefitsContribution, benefits),
                (TransactionKind::PlatformFee, employer_fee),
            ];
            for (kind, amount) in treasury_entries {
                if amount > Decimal::ZERO {
                    unit.credit(
                        treasury,
                        TxDraft::new(kind, amount)
                            .reference(reference.clone())
                            .correlation(correlation),
                    )?;
                }
            }
            Ok(())
        });
        if let Err(err) = result {
            self.payroll.runs.lock().release(&(contract, period));
            return Err(err);
        }

        let record = PayrollRecord {
            id: PayrollId::new(),
            contract,
            employee,
            period,
            gross,
            tax,
            benefits,
            employer_fee,
            net,
            processed_at: now,
        };
        self.payroll.records.write().push(record.clone());
        tracing::info!(
            contract = %contract,
            period = %period,
            gross = %gross,
            tax = %tax,
            benefits = %benefits,
            net = %net,
            "payroll processed"
        );
        self.notify(employee, NotificationKind::PayrollProcessed, format!("Salary of {net} paid for {period}"))
            .await;
        Ok(record)
    }

    #[must_use]
    pub fn payroll_records(&self, contract: ContractId) -> Vec<PayrollRecord> {
        self.payroll
            .records
            .read()
            .iter()
            .filter(|r| r.contract == contract)
            .cloned()
            .collect()
    }

    /// Process every EOR payroll the contract directory reports as due.
    pub async fn run_payroll_cycle(&self) -> Result<BatchReport> {
        let due = self.contract_due_payroll(self.clock.now()).await?;
        let mut report = BatchReport::default();
        for run in due {
            let request = PayrollRequest {
                employee: run.employee,
                period_start: run.period_start,
                period_end: run.period_end,
                gross: run.gross,
            };
            match self.process_payroll(run.contract, request).await {
                Ok(_) => report.processed += 1,
                Err(PaysettleError::PayrollAlreadyProcessed) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(contract = %run.contract, error = %err, "payroll run failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
