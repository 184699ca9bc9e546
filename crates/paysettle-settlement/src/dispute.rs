//! Disputes, arbitration cases and evidence.
//!
//! The desk owns dispute state and moves money only through the
//! controller's ledger: the arbitration fee is charged to both parties in
//! one unit, and a split resolution goes through `split_release`.
//!
//! Evidence is append-only and locks once the dispute is final or its
//! case has left `OPEN`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use paysettle_types::constants::SYSTEM_ESCALATION_RESOLUTION;
use paysettle_types::money::{ensure_percent, round_money};
use paysettle_types::{
    ArbitrationCase, CaseId, CaseStatus, ContractId, CorrelationId, Dispute, DisputeId,
    DisputeStatus, Evidence, EvidenceId, MilestoneId, OwnerId, PaysettleError, Result,
    TransactionKind, TxDraft,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::api::{BatchReport, SplitReleaseOutcome, SplitReleaseRequest};
use crate::controller::SettlementController;
use crate::ports::NotificationKind;

/// Hex SHA-256 over `file_url`, a newline, and `description`.
#[must_use]
pub fn evidence_digest(file_url: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_url.as_bytes());
    hasher.update(b"\n");
    hasher.update(description.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
struct DeskState {
    disputes: HashMap<DisputeId, Dispute>,
    cases: HashMap<CaseId, ArbitrationCase>,
    evidence: Vec<Evidence>,
}

impl DeskState {
    fn dispute_mut(&mut self, id: DisputeId) -> Result<&mut Dispute> {
        self.disputes
            .get_mut(&id)
            .ok_or(PaysettleError::DisputeNotFound(id))
    }

    fn case_mut(&mut self, id: CaseId) -> Result<&mut ArbitrationCase> {
        self.cases.get_mut(&id).ok_or(PaysettleError::CaseNotFound(id))
    }

    fn case_for(&self, dispute: DisputeId) -> Option<&ArbitrationCase> {
        self.cases.values().find(|c| c.dispute == dispute)
    }

    /// The dispute behind `case`, provided the case can still be decided.
    fn decidable(&self, case: CaseId) -> Result<&Dispute> {
        let entry = self.cases.get(&case).ok_or(PaysettleError::CaseNotFound(case))?;
        if entry.status == CaseStatus::Resolved {
            return Err(PaysettleError::CaseClosed);
        }
        let dispute = self
            .disputes
            .get(&entry.dispute)
            .ok_or(PaysettleError::DisputeNotFound(entry.dispute))?;
        if dispute.status != DisputeStatus::UnderReview {
            return Err(PaysettleError::DisputeNotOpen);
        }
        Ok(dispute)
    }

    fn open_case(&mut self, dispute: DisputeId, fee: Decimal, now: DateTime<Utc>) -> ArbitrationCase {
        let case = ArbitrationCase {
            id: CaseId::new(),
            dispute,
            reviewer: None,
            fee_charged: fee,
            status: CaseStatus::Open,
            decision: None,
            freelancer_percentage: None,
            created_at: now,
            resolved_at: None,
        };
        self.cases.insert(case.id, case.clone());
        case
    }
}

/// Dispute lifecycle on top of a [`SettlementController`].
pub struct DisputeDesk {
    controller: Arc<SettlementController>,
    state: Mutex<DeskState>,
}

impl DisputeDesk {
    #[must_use]
    pub fn new(controller: Arc<SettlementController>) -> Self {
        Self {
            controller,
            state: Mutex::new(DeskState::default()),
        }
    }

    #[must_use]
    pub fn controller(&self) -> &Arc<SettlementController> {
        &self.controller
    }

    // -----------------------------------------------------------------------
    // Disputes
    // -----------------------------------------------------------------------

    /// Open a dispute on a contract. Only its client or freelancer may.
    pub async fn open_dispute(
        &self,
        contract: ContractId,
        opened_by: OwnerId,
        reason: &str,
    ) -> Result<Dispute> {
        if reason.trim().is_empty() {
            return Err(PaysettleError::invalid_request("dispute reason is empty"));
        }
        let info = self.controller.contract(contract).await?;
        if !info.is_party(opened_by) {
            return Err(PaysettleError::NotAParticipant(opened_by));
        }
        let now = self.controller.now();
        let dispute = {
            let mut state = self.state.lock();
            let active = state
                .disputes
                .values()
                .any(|d| d.contract == contract && !d.status.is_final());
            if active {
                return Err(PaysettleError::invalid_request(format!(
                    "contract {contract} already has an active dispute"
                )));
            }
            let dispute = Dispute {
                id: DisputeId::new(),
                contract,
                client: info.client_id,
                freelancer: info.freelancer_id,
                opened_by,
                reason: reason.to_string(),
                status: DisputeStatus::Open,
                timeout_at: now + Duration::days(self.controller.config().disputes.timeout_days),
                resolution: None,
                created_at: now,
                resolved_at: None,
            };
            state.disputes.insert(dispute.id, dispute.clone());
            dispute
        };

        tracing::info!(dispute = %dispute.id, contract = %contract, opened_by = %opened_by, "dispute opened");
        let counterparty = if opened_by == dispute.client {
            dispute.freelancer
        } else {
            dispute.client
        };
        self.controller
            .notify(counterparty, NotificationKind::DisputeOpened, format!("A dispute was opened: {reason}"))
            .await;
        Ok(dispute)
    }

    /// Escalate an open dispute, charging the arbitration fee split evenly
    /// across both parties.
    ///
    /// # Errors
    /// - `DisputeNotOpen` unless the dispute is `OPEN`
    /// - `InsufficientFunds` if either party cannot pay; nobody is charged
    pub async fn escalate_to_arbitration(
        &self,
        dispute: DisputeId,
        requested_by: OwnerId,
    ) -> Result<ArbitrationCase> {
        let fee = self.controller.config().fees.arbitration_fee;
        let client_share = round_money(fee / Decimal::TWO);
        let freelancer_share = fee - client_share;
        let now = self.controller.now();

        let (case, parties) = {
            let mut state = self.state.lock();
            let entry = state.dispute_mut(dispute)?;
            if !entry.is_party(requested_by) {
                return Err(PaysettleError::NotAParticipant(requested_by));
            }
            if entry.status != DisputeStatus::Open {
                return Err(PaysettleError::DisputeNotOpen);
            }
            let (client, freelancer) = (entry.client, entry.freelancer);
            let reference = entry.contract.0.to_string();
            let treasury = OwnerId::treasury();
            let correlation = CorrelationId::new();
            self.controller
                .ledger
                .atomic(&[client, freelancer, treasury], now, |unit| {
                    for (party, share) in [(client, client_share), (freelancer, freelancer_share)] {
                        if share > Decimal::ZERO {
                            unit.debit(
                                party,
                                TxDraft::new(TransactionKind::ArbitrationFee, share)
                                    .reference(reference.clone())
                                    .correlation(correlation)
                                    .description("Arbitration fee"),
                            )?;
                        }
                    }
                    if fee > Decimal::ZERO {
                        unit.credit(
                            treasury,
                            TxDraft::new(TransactionKind::PlatformFee, fee)
                                .reference(reference.clone())
                                .correlation(correlation)
                                .description("Arbitration fee"),
                        )?;
                    }
                    Ok(())
                })?;
            entry.status = DisputeStatus::UnderReview;
            let case = state.open_case(dispute, fee, now);
            (case, [client, freelancer])
        };

        tracing::info!(dispute = %dispute, case = %case.id, fee = %fee, "dispute escalated to arbitration");
        for party in parties {
            self.controller
                .notify(party, NotificationKind::DisputeEscalated, "Dispute escalated to arbitration")
                .await;
        }
        Ok(case)
    }

    /// Move every open dispute past its deadline under review, without a fee.
    pub async fn escalate_timed_out(&self) -> BatchReport {
        let now = self.controller.now();
        let escalated: Vec<Dispute> = {
            let mut state = self.state.lock();
            let due: Vec<DisputeId> = state
                .disputes
                .values()
                .filter(|d| d.is_timed_out(now))
                .map(|d| d.id)
                .collect();
            let mut escalated = Vec::with_capacity(due.len());
            for id in due {
                if let Some(dispute) = state.disputes.get_mut(&id) {
                    dispute.status = DisputeStatus::UnderReview;
                    dispute.resolution = Some(SYSTEM_ESCALATION_RESOLUTION.to_string());
                    escalated.push(dispute.clone());
                }
                state.open_case(id, Decimal::ZERO, now);
            }
            escalated
        };

        for dispute in &escalated {
            tracing::info!(dispute = %dispute.id, "dispute escalated after timeout");
            for party in [dispute.client, dispute.freelancer] {
                self.controller
                    .notify(party, NotificationKind::DisputeEscalated, SYSTEM_ESCALATION_RESOLUTION)
                    .await;
            }
        }
        BatchReport {
            processed: escalated.len(),
            ..BatchReport::default()
        }
    }

    /// Close a dispute without arbitration.
    ///
    /// Once escalated, a dispute ends only through its case.
    pub fn close_dispute(&self, dispute: DisputeId, closed_by: OwnerId, resolution: &str) -> Result<Dispute> {
        let now = self.controller.now();
        let mut state = self.state.lock();
        let arbitrating = state
            .case_for(dispute)
            .is_some_and(|case| case.status != CaseStatus::Resolved);
        let entry = state.dispute_mut(dispute)?;
        if !entry.is_party(closed_by) {
            return Err(PaysettleError::NotAParticipant(closed_by));
        }
        if entry.status.is_final() {
            return Err(PaysettleError::DisputeNotOpen);
        }
        if arbitrating {
            return Err(PaysettleError::ArbitrationPending);
        }
        entry.status = DisputeStatus::Closed;
        entry.resolution = Some(resolution.to_string());
        entry.resolved_at = Some(now);
        Ok(entry.clone())
    }

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    pub fn add_evidence(
        &self,
        dispute: DisputeId,
        uploaded_by: OwnerId,
        file_url: &str,
        description: &str,
    ) -> Result<Evidence> {
        if file_url.trim().is_empty() {
            return Err(PaysettleError::invalid_request("evidence file url is empty"));
        }
        let mut state = self.state.lock();
        let entry = state
            .disputes
            .get(&dispute)
            .ok_or(PaysettleError::DisputeNotFound(dispute))?;
        if !entry.is_party(uploaded_by) {
            return Err(PaysettleError::NotAParticipant(uploaded_by));
        }
        if entry.status.is_final() {
            return Err(PaysettleError::EvidenceLocked);
        }
        if state
            .case_for(dispute)
            .is_some_and(|c| c.status != CaseStatus::Open)
        {
            return Err(PaysettleError::EvidenceLocked);
        }

        let evidence = Evidence {
            id: EvidenceId::new(),
            dispute,
            uploaded_by,
            file_url: file_url.to_string(),
            description: description.to_string(),
            digest: evidence_digest(file_url, description),
            submitted_at: self.controller.now(),
        };
        state.evidence.push(evidence.clone());
        tracing::debug!(dispute = %dispute, evidence = %evidence.id, "evidence added");
        Ok(evidence)
    }

    /// Delete evidence of disputes resolved longer ago than the retention
    /// window. Returns how many records were removed.
    pub fn purge_expired_evidence(&self) -> usize {
        let cutoff = self.controller.now()
            - Duration::days(self.controller.config().disputes.evidence_retention_days);
        let mut state = self.state.lock();
        let DeskState {
            disputes, evidence, ..
        } = &mut *state;
        let before = evidence.len();
        evidence.retain(|e| {
            disputes
                .get(&e.dispute)
                .and_then(|d| d.resolved_at)
                .is_none_or(|at| at > cutoff)
        });
        let removed = before - evidence.len();
        if removed > 0 {
            tracing::info!(removed, "expired evidence purged");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Arbitration cases
    // -----------------------------------------------------------------------

    pub fn assign_reviewer(&self, case: CaseId, reviewer: OwnerId) -> Result<ArbitrationCase> {
        let mut state = self.state.lock();
        let entry = state.case_mut(case)?;
        if entry.status == CaseStatus::Resolved {
            return Err(PaysettleError::CaseClosed);
        }
        entry.reviewer = Some(reviewer);
        entry.status = CaseStatus::InReview;
        Ok(entry.clone())
    }

    /// Record a decision that moves no funds.
    pub async fn resolve_case(&self, case: CaseId, decision: &str) -> Result<ArbitrationCase> {
        let (case, dispute) = self.finish_case(case, decision, None)?;
        self.announce_resolution(&dispute, decision).await;
        Ok(case)
    }

    /// Resolve by releasing `freelancer_percentage` of the milestone's hold
    /// to the freelancer and refunding the rest to the client.
    pub async fn resolve_case_with_split(
        &self,
        case: CaseId,
        milestone: MilestoneId,
        freelancer_percentage: Decimal,
        decision: &str,
    ) -> Result<(ArbitrationCase, SplitReleaseOutcome)> {
        let percent = ensure_percent(freelancer_percentage)?;
        let dispute = self.state.lock().decidable(case)?.clone();

        let outcome = self
            .controller
            .split_release(SplitReleaseRequest {
                contract: dispute.contract,
                milestone,
                freelancer: dispute.freelancer,
                freelancer_percentage: percent,
            })
            .await?;

        let (case, dispute) = self.finish_case(case, decision, Some(percent))?;
        tracing::info!(case = %case.id, dispute = %dispute.id, percent = %percent, "case resolved with split");
        self.announce_resolution(&dispute, decision).await;
        Ok((case, outcome))
    }

    fn finish_case(
        &self,
        case: CaseId,
        decision: &str,
        freelancer_percentage: Option<Decimal>,
    ) -> Result<(ArbitrationCase, Dispute)> {
        let now = self.controller.now();
        let mut state = self.state.lock();
        state.decidable(case)?;
        let entry = state.case_mut(case)?;
        entry.status = CaseStatus::Resolved;
        entry.decision = Some(decision.to_string());
        entry.freelancer_percentage = freelancer_percentage;
        entry.resolved_at = Some(now);
        let case = entry.clone();

        let dispute = state.dispute_mut(case.dispute)?;
        dispute.status = DisputeStatus::Resolved;
        dispute.resolution = Some(decision.to_string());
        dispute.resolved_at = Some(now);
        Ok((case, dispute.clone()))
    }

    async fn announce_resolution(&self, dispute: &Dispute, decision: &str) {
        for party in [dispute.client, dispute.freelancer] {
            self.controller
                .notify(party, NotificationKind::DisputeResolved, format!("Dispute resolved: {decision}"))
                .await;
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn dispute(&self, id: DisputeId) -> Result<Dispute> {
        self.state
            .lock()
            .disputes
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::DisputeNotFound(id))
    }

    pub fn case(&self, id: CaseId) -> Result<ArbitrationCase> {
        self.state
            .lock()
            .cases
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::CaseNotFound(id))
    }

    #[must_use]
    pub fn case_for_dispute(&self, dispute: DisputeId) -> Option<ArbitrationCase> {
        self.state.lock().case_for(dispute).cloned()
    }

    /// Evidence of a dispute in submission order.
    #[must_use]
    pub fn evidence(&self, dispute: DisputeId) -> Vec<Evidence> {
        self.state
            .lock()
            .evidence
            .iter()
            .filter(|e| e.dispute == dispute)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryContracts, InMemoryUsers, Ports, RecordingNotifier};
    use chrono::TimeZone;
    use paysettle_payout::RailRegistry;
    use paysettle_rates::{InMemoryTaxSettings, StaticRateSource, fallback_rates};
    use paysettle_types::{
        Clock, ContractId, ContractInfo, ContractKind, ContractStatus, ManualClock,
        SettlementConfig, UserProfile,
    };

    struct Fixture {
        desk: DisputeDesk,
        contract: ContractId,
        client: OwnerId,
        freelancer: OwnerId,
        milestone: MilestoneId,
    }

    /// A funded 100.00 milestone under an open dispute. Both parties can
    /// cover the arbitration fee.
    async fn disputed_milestone() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 2, 9, 0, 0).unwrap()));
        let contracts = Arc::new(InMemoryContracts::new());
        let users = Arc::new(InMemoryUsers::new());
        let (client, freelancer) = (OwnerId::new(), OwnerId::new());
        for id in [client, freelancer] {
            users.upsert(UserProfile {
                id,
                jurisdiction: "DE".into(),
                tax_verified: true,
            });
        }
        let contract = ContractId::new();
        contracts.upsert(ContractInfo {
            id: contract,
            client_id: client,
            freelancer_id: freelancer,
            agency_id: None,
            agency_split_percent: None,
            kind: ContractKind::Fixed,
            status: ContractStatus::Active,
            hourly_rate: None,
            employer_fee_percent: None,
        });
        let ports = Ports {
            contracts,
            users,
            notifier: Arc::new(RecordingNotifier::new()),
            rates: Arc::new(StaticRateSource::new("USD", fallback_rates())),
            tax_settings: Arc::new(InMemoryTaxSettings::new()),
            rails: RailRegistry::simulated(),
        };
        let controller = Arc::new(SettlementController::new(
            SettlementConfig::default(),
            clock as Arc<dyn Clock>,
            ports,
        ));
        for (owner, amount) in [(client, 200), (freelancer, 50)] {
            controller
                .deposit(crate::DepositRequest {
                    owner,
                    amount: Decimal::from(amount),
                    reference_id: format!("pi_{owner}"),
                })
                .await
                .unwrap();
        }
        let milestone = MilestoneId::new();
        controller
            .fund_escrow(contract, milestone, client, Decimal::from(100), None)
            .await
            .unwrap();
        let desk = DisputeDesk::new(controller);
        desk.open_dispute(contract, client, "late delivery").await.unwrap();
        Fixture {
            desk,
            contract,
            client,
            freelancer,
            milestone,
        }
    }

    #[tokio::test]
    async fn escalated_dispute_cannot_be_closed() {
        let f = disputed_milestone().await;
        let dispute = f.desk.state.lock().disputes.values().next().unwrap().id;
        let case = f.desk.escalate_to_arbitration(dispute, f.client).await.unwrap();

        let err = f.desk.close_dispute(dispute, f.freelancer, "dropping it").unwrap_err();
        assert!(matches!(err, PaysettleError::ArbitrationPending));
        assert_eq!(f.desk.dispute(dispute).unwrap().status, DisputeStatus::UnderReview);

        let (case, split) = f
            .desk
            .resolve_case_with_split(case.id, f.milestone, Decimal::from(50), "shared fault")
            .await
            .unwrap();
        assert_eq!(case.status, CaseStatus::Resolved);
        assert_eq!(split.client_refund, Decimal::from(50));
        let err = f.desk.close_dispute(dispute, f.client, "late").unwrap_err();
        assert!(matches!(err, PaysettleError::DisputeNotOpen));
    }

    #[tokio::test]
    async fn case_of_a_settled_dispute_moves_no_funds() {
        let f = disputed_milestone().await;
        let dispute = f.desk.state.lock().disputes.values().next().unwrap().id;
        let case = f.desk.escalate_to_arbitration(dispute, f.client).await.unwrap();
        f.desk.state.lock().dispute_mut(dispute).unwrap().status = DisputeStatus::Closed;
        let controller = Arc::clone(f.desk.controller());
        let held = controller.escrow().total_held();

        let err = f
            .desk
            .resolve_case_with_split(case.id, f.milestone, Decimal::from(50), "split")
            .await
            .unwrap_err();
        assert!(matches!(err, PaysettleError::DisputeNotOpen));
        let err = f.desk.resolve_case(case.id, "no funds").await.unwrap_err();
        assert!(matches!(err, PaysettleError::DisputeNotOpen));

        assert_eq!(controller.escrow().total_held(), held);
        assert_eq!(f.desk.case(case.id).unwrap().status, CaseStatus::Open);
        let freelancer = controller.wallet_view(f.freelancer).await.unwrap().wallet;
        assert_eq!(freelancer.available, Decimal::from(25));
        assert!(controller.escrow().active_hold(f.contract, f.milestone).is_ok());
        controller.verify_conservation().unwrap();
    }

    #[test]
    fn digest_covers_url_and_description() {
        let a = evidence_digest("s3://bucket/a.pdf", "signed delivery");
        assert_eq!(a.len(), 64);
        assert_eq!(a, evidence_digest("s3://bucket/a.pdf", "signed delivery"));
        assert_ne!(a, evidence_digest("s3://bucket/a.pdf", "signed delivery "));
        assert_ne!(a, evidence_digest("s3://bucket/b.pdf", "signed delivery"));
    }
}
