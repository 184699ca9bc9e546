//! The settlement jobs.
//!
//! | job                    | default cadence | work                                   |
//! |------------------------|-----------------|----------------------------------------|
//! | `auto_release`         | 6 h             | release holds past their review window |
//! | `dispute_timeout`      | 12 h            | escalate stale open disputes           |
//! | `evidence_cleanup`     | daily           | purge evidence past retention          |
//! | `auto_withdrawal`      | daily           | sweep wallets over their threshold     |
//! | `subscription_renewal` | daily           | charge due subscriptions               |
//! | `payroll_cycle`        | daily           | pay EOR periods that have ended        |
//!
//! Clearing of pending credits has no job: it happens when a wallet is read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use paysettle_settlement::{BatchReport, DisputeDesk, SettlementController};
use paysettle_types::{Result, SchedulerConfig};

use crate::scheduler::{Job, Scheduler};

pub struct AutoReleaseJob {
    controller: Arc<SettlementController>,
    period: Duration,
}

#[async_trait]
impl Job for AutoReleaseJob {
    fn name(&self) -> &'static str {
        "auto_release"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        Ok(self.controller.run_auto_release().await)
    }
}

pub struct DisputeTimeoutJob {
    desk: Arc<DisputeDesk>,
    period: Duration,
}

#[async_trait]
impl Job for DisputeTimeoutJob {
    fn name(&self) -> &'static str {
        "dispute_timeout"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        Ok(self.desk.escalate_timed_out().await)
    }
}

pub struct EvidenceCleanupJob {
    desk: Arc<DisputeDesk>,
    period: Duration,
}

#[async_trait]
impl Job for EvidenceCleanupJob {
    fn name(&self) -> &'static str {
        "evidence_cleanup"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        Ok(BatchReport {
            processed: self.desk.purge_expired_evidence(),
            ..BatchReport::default()
        })
    }
}

pub struct AutoWithdrawalJob {
    controller: Arc<SettlementController>,
    period: Duration,
}

#[async_trait]
impl Job for AutoWithdrawalJob {
    fn name(&self) -> &'static str {
        "auto_withdrawal"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        Ok(self.controller.run_auto_withdrawals().await)
    }
}

pub struct SubscriptionRenewalJob {
    controller: Arc<SettlementController>,
    period: Duration,
}

#[async_trait]
impl Job for SubscriptionRenewalJob {
    fn name(&self) -> &'static str {
        "subscription_renewal"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        Ok(self.controller.run_subscription_renewals().await)
    }
}

pub struct PayrollCycleJob {
    controller: Arc<SettlementController>,
    period: Duration,
}

#[async_trait]
impl Job for PayrollCycleJob {
    fn name(&self) -> &'static str {
        "payroll_cycle"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run(&self) -> Result<BatchReport> {
        self.controller.run_payroll_cycle().await
    }
}

/// Every settlement job at its configured cadence.
#[must_use]
pub fn settlement_jobs(
    controller: &Arc<SettlementController>,
    desk: &Arc<DisputeDesk>,
    config: &SchedulerConfig,
) -> Vec<Arc<dyn Job>> {
    let every = Duration::from_secs;
    vec![
        Arc::new(AutoReleaseJob {
            controller: Arc::clone(controller),
            period: every(config.auto_release_secs),
        }),
        Arc::new(DisputeTimeoutJob {
            desk: Arc::clone(desk),
            period: every(config.dispute_timeout_secs),
        }),
        Arc::new(EvidenceCleanupJob {
            desk: Arc::clone(desk),
            period: every(config.evidence_cleanup_secs),
        }),
        Arc::new(AutoWithdrawalJob {
            controller: Arc::clone(controller),
            period: every(config.auto_withdrawal_secs),
        }),
        Arc::new(SubscriptionRenewalJob {
            controller: Arc::clone(controller),
            period: every(config.subscription_renewal_secs),
        }),
        Arc::new(PayrollCycleJob {
            controller: Arc::clone(controller),
            period: every(config.payroll_secs),
        }),
    ]
}

/// A scheduler with every settlement job registered.
pub fn settlement_scheduler(
    controller: &Arc<SettlementController>,
    desk: &Arc<DisputeDesk>,
    config: &SchedulerConfig,
) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new();
    for job in settlement_jobs(controller, desk, config) {
        scheduler.register(job)?;
    }
    Ok(scheduler)
}
