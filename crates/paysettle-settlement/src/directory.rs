//! In-memory port implementations for tests and the standalone daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use paysettle_types::{
    ContractId, ContractInfo, ContractKind, ContractStatus, OwnerId, PaysettleError, Result,
    UserProfile,
};

use crate::ports::{
    ContractDirectory, Notification, NotificationKind, Notifier, PayrollDue, UserDirectory,
};

#[derive(Debug, Default)]
pub struct InMemoryContracts {
    contracts: RwLock<HashMap<ContractId, ContractInfo>>,
    payroll: RwLock<Vec<PayrollDue>>,
}

impl InMemoryContracts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, contract: ContractInfo) {
        self.contracts.write().insert(contract.id, contract);
    }

    pub fn set_status(&self, id: ContractId, status: ContractStatus) -> Result<()> {
        let mut contracts = self.contracts.write();
        let contract = contracts
            .get_mut(&id)
            .ok_or(PaysettleError::ContractNotFound(id))?;
        contract.status = status;
        Ok(())
    }

    /// Queue a payroll run; it is reported once its period has ended.
    pub fn schedule_payroll(&self, due: PayrollDue) {
        self.payroll.write().push(due);
    }
}

#[async_trait]
impl ContractDirectory for InMemoryContracts {
    async fn contract(&self, id: ContractId) -> Result<ContractInfo> {
        self.contracts
            .read()
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::ContractNotFound(id))
    }

    async fn eor_contracts_due(&self, now: DateTime<Utc>) -> Result<Vec<PayrollDue>> {
        let today = now.date_naive();
        let contracts = self.contracts.read();
        Ok(self
            .payroll
            .read()
            .iter()
            .filter(|due| due.period_end <= today)
            .filter(|due| {
                contracts.get(&due.contract).is_some_and(|c| {
                    c.kind == ContractKind::Eor && c.status == ContractStatus::Active
                })
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUsers {
    profiles: RwLock<HashMap<OwnerId, UserProfile>>,
}

impl InMemoryUsers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.id, profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn profile(&self, id: OwnerId) -> Result<UserProfile> {
        self.profiles
            .read()
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::UserNotFound(id))
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            kind = ?notification.kind,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Notifications of `kind` sent to `recipient`.
    #[must_use]
    pub fn count(&self, recipient: OwnerId, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.recipient == recipient && n.kind == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}
