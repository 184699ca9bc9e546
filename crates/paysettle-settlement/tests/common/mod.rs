//! Shared harness for the settlement integration tests.
//!
//! Wires a [`SettlementController`] to in-memory collaborators and a manual
//! clock starting on Tuesday 2026-06-02, 09:00 UTC.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use paysettle_payout::RailRegistry;
use paysettle_rates::{InMemoryTaxSettings, StaticRateSource, fallback_rates};
use paysettle_settlement::{
    DepositRequest, DisputeDesk, InMemoryContracts, InMemoryUsers, Ports, RecordingNotifier,
    SettlementController,
};
use paysettle_types::{
    Clock, ContractId, ContractInfo, ContractKind, ContractStatus, ManualClock, MethodId,
    NewWithdrawalMethod, OwnerId, SettlementConfig, UserProfile, WithdrawalMethodKind,
};
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub controller: Arc<SettlementController>,
    pub desk: DisputeDesk,
    pub contracts: Arc<InMemoryContracts>,
    pub users: Arc<InMemoryUsers>,
    pub notifier: Arc<RecordingNotifier>,
    pub tax_settings: Arc<InMemoryTaxSettings>,
    deposits: std::sync::atomic::AtomicUsize,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rails(RailRegistry::simulated())
    }

    pub fn with_rails(rails: RailRegistry) -> Self {
        Self::build(SettlementConfig::default(), rails)
    }

    pub fn build(config: SettlementConfig, rails: RailRegistry) -> Self {
        let clock = Arc::new(ManualClock::new(at(2026, 6, 2, 9)));
        let contracts = Arc::new(InMemoryContracts::new());
        let users = Arc::new(InMemoryUsers::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let tax_settings = Arc::new(InMemoryTaxSettings::new());
        let ports = Ports {
            contracts: contracts.clone(),
            users: users.clone(),
            notifier: notifier.clone(),
            rates: Arc::new(StaticRateSource::new("USD", fallback_rates())),
            tax_settings: tax_settings.clone(),
            rails,
        };
        let controller = Arc::new(SettlementController::new(
            config,
            clock.clone() as Arc<dyn Clock>,
            ports,
        ));
        Self {
            desk: DisputeDesk::new(controller.clone()),
            clock,
            controller,
            contracts,
            users,
            notifier,
            tax_settings,
            deposits: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A user with a tax profile.
    pub fn user(&self, jurisdiction: &str, tax_verified: bool) -> OwnerId {
        let id = OwnerId::new();
        self.users.upsert(UserProfile {
            id,
            jurisdiction: jurisdiction.to_string(),
            tax_verified,
        });
        id
    }

    /// An active contract between `client` and `freelancer`.
    pub fn contract(&self, kind: ContractKind, client: OwnerId, freelancer: OwnerId) -> ContractInfo {
        let info = ContractInfo {
            id: ContractId::new(),
            client_id: client,
            freelancer_id: freelancer,
            agency_id: None,
            agency_split_percent: None,
            kind,
            status: ContractStatus::Active,
            hourly_rate: None,
            employer_fee_percent: None,
        };
        self.contracts.upsert(info.clone());
        info
    }

    /// Deposit with a fresh reference.
    pub async fn deposit(&self, owner: OwnerId, amount: &str) {
        let n = self.deposits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.controller
            .deposit(DepositRequest {
                owner,
                amount: dec(amount),
                reference_id: format!("pi_{n}"),
            })
            .await
            .unwrap();
    }

    pub fn add_bank(&self, owner: OwnerId, instant_capable: bool) -> MethodId {
        self.controller
            .add_method(
                owner,
                NewWithdrawalMethod {
                    kind: WithdrawalMethodKind::Bank,
                    is_default: true,
                    instant_capable,
                    provider_account: "acct_001".into(),
                    provider_label: Some("Checking".into()),
                },
            )
            .unwrap()
            .id
    }

    /// Available balance after lazy clearing.
    pub async fn available(&self, owner: OwnerId) -> Decimal {
        self.controller.wallet_view(owner).await.unwrap().wallet.available
    }

    pub async fn pending(&self, owner: OwnerId) -> Decimal {
        self.controller.wallet_view(owner).await.unwrap().wallet.pending
    }

    pub async fn treasury(&self) -> Decimal {
        self.available(OwnerId::treasury()).await
    }

    pub fn assert_conserved(&self) {
        self.controller.verify_conservation().unwrap();
    }
}
