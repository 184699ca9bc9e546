//! Hourly billing: freelancers log time, clients approve or reject it.
//!
//! Approval charges the client `hours × hourly_rate` and pays the
//! freelancer through the same agency-split and withholding path as an
//! escrow release, all in one ledger unit.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::Mutex;
use paysettle_types::constants::MAX_HOURS_PER_LOG;
use paysettle_types::money::round_money;
use paysettle_types::{
    ContractId, ContractInfo, ContractKind, ContractStatus, CorrelationId, OwnerId,
    PaysettleError, Result, TimeLog, TimeLogId, TimeLogStatus, TransactionKind, TxDraft,
};
use rust_decimal::Decimal;

use crate::api::ReleaseBreakdown;
use crate::controller::SettlementController;
use crate::ports::NotificationKind;

#[derive(Debug, Default)]
pub(crate) struct TimeLogBook {
    logs: Mutex<HashMap<TimeLogId, TimeLog>>,
}

impl TimeLogBook {
    fn get(&self, id: TimeLogId) -> Result<TimeLog> {
        self.logs
            .lock()
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::TimeLogNotFound(id))
    }
}

fn ensure_hourly(contract: &ContractInfo) -> Result<()> {
    if contract.kind != ContractKind::Hourly {
        return Err(PaysettleError::ContractKindMismatch {
            expected: ContractKind::Hourly.to_string(),
        });
    }
    Ok(())
}

fn ensure_active(contract: &ContractInfo) -> Result<()> {
    if contract.status != ContractStatus::Active {
        return Err(PaysettleError::ContractNotActive {
            reason: format!("contract is {}", contract.status),
        });
    }
    Ok(())
}

impl SettlementController {
    /// Record hours against an active hourly contract.
    pub async fn log_time(
        &self,
        contract: ContractId,
        freelancer: OwnerId,
        hours: Decimal,
        description: &str,
        work_date: NaiveDate,
    ) -> Result<TimeLog> {
        if hours <= Decimal::ZERO || hours > MAX_HOURS_PER_LOG {
            return Err(PaysettleError::invalid_request(format!(
                "hours must be within (0, {MAX_HOURS_PER_LOG}], got {hours}"
            )));
        }
        let info = self.contract(contract).await?;
        ensure_hourly(&info)?;
        ensure_active(&info)?;
        if info.freelancer_id != freelancer {
            return Err(PaysettleError::NotAParticipant(freelancer));
        }

        let log = TimeLog {
            id: TimeLogId::new(),
            contract,
            freelancer,
            hours,
            description: description.to_string(),
            work_date,
            status: TimeLogStatus::Pending,
            rejection_reason: None,
            created_at: self.clock.now(),
            decided_at: None,
        };
        self.time_logs.logs.lock().insert(log.id, log.clone());
        tracing::info!(log = %log.id, contract = %contract, hours = %hours, "time logged");
        self.notify(info.client_id, NotificationKind::TimeLogged, format!("{hours} hours logged for {work_date}"))
            .await;
        Ok(log)
    }

    /// Approve a pending log: debit the client and pay the freelancer.
    ///
    /// # Errors
    /// - `TimeLogNotPending` if the log was already decided
    /// - `ContractNotActive` if the contract was paused or ended since
    /// - `NotAParticipant` unless `approver` is the contract's client
    /// - `InsufficientFunds` if the client cannot cover the amount
    pub async fn approve_time_log(
        &self,
        id: TimeLogId,
        approver: OwnerId,
    ) -> Result<(TimeLog, ReleaseBreakdown)> {
        let log = self.time_logs.get(id)?;
        if log.status != TimeLogStatus::Pending {
            return Err(PaysettleError::TimeLogNotPending);
        }
        let info = self.contract(log.contract).await?;
        ensure_hourly(&info)?;
        ensure_active(&info)?;
        if info.client_id != approver {
            return Err(PaysettleError::NotAParticipant(approver));
        }
        let rate = info
            .hourly_rate
            .filter(|r| *r > Decimal::ZERO)
            .ok_or_else(|| PaysettleError::invalid_request("contract has no hourly rate"))?;
        let gross = round_money(log.hours * rate);
        let plan = self.plan_release(&info, info.agency_split(), log.freelancer, gross, None).await?;

        let client = info.client_id;
        let mut owners = plan.owners();
        owners.push(client);
        let correlation = CorrelationId::new();
        let now = self.clock.now();

        let (log, breakdown) = {
            let mut logs = self.time_logs.logs.lock();
            let entry = logs.get_mut(&id).ok_or(PaysettleError::TimeLogNotFound(id))?;
            if entry.status != TimeLogStatus::Pending {
                return Err(PaysettleError::TimeLogNotPending);
            }
            let breakdown = self.ledger.atomic(&owners, now, |unit| {
                unit.debit(
                    client,
                    TxDraft::new(TransactionKind::PaymentOut, gross)
                        .reference(info.id.0.to_string())
                        .correlation(correlation)
                        .description(format!("{} hours at {rate}", entry.hours)),
                )?;
                plan.apply(unit, TransactionKind::PaymentIn, correlation)
            })?;
            entry.status = TimeLogStatus::Approved;
            entry.decided_at = Some(now);
            (entry.clone(), breakdown)
        };

        tracing::info!(log = %id, gross = %gross, net = %breakdown.net, "time log approved");
        self.notify(log.freelancer, NotificationKind::TimeLogApproved, format!("Time log approved, {} paid", breakdown.net))
            .await;
        Ok((log, breakdown))
    }

    pub async fn reject_time_log(&self, id: TimeLogId, approver: OwnerId, reason: &str) -> Result<TimeLog> {
        let log = self.time_logs.get(id)?;
        let info = self.contract(log.contract).await?;
        if info.client_id != approver {
            return Err(PaysettleError::NotAParticipant(approver));
        }
        let log = {
            let mut logs = self.time_logs.logs.lock();
            let entry = logs.get_mut(&id).ok_or(PaysettleError::TimeLogNotFound(id))?;
            if entry.status != TimeLogStatus::Pending {
                return Err(PaysettleError::TimeLogNotPending);
            }
            entry.status = TimeLogStatus::Rejected;
            entry.rejection_reason = Some(reason.to_string());
            entry.decided_at = Some(self.clock.now());
            entry.clone()
        };
        self.notify(log.freelancer, NotificationKind::TimeLogRejected, format!("Time log rejected: {reason}"))
            .await;
        Ok(log)
    }

    pub fn time_log(&self, id: TimeLogId) -> Result<TimeLog> {
        self.time_logs.get(id)
    }

    /// Logs of a contract, oldest work date first.
    #[must_use]
    pub fn time_logs_for(&self, contract: ContractId) -> Vec<TimeLog> {
        let mut logs: Vec<_> = self
            .time_logs
            .logs
            .lock()
            .values()
            .filter(|l| l.contract == contract)
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.work_date, l.created_at));
        logs
    }
}
