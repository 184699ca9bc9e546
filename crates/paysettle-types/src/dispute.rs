//! Dispute, arbitration case and evidence records.
//!
//! ```text
//! Dispute:  OPEN ──escalate/timeout──▶ UNDER_REVIEW ──resolve──▶ RESOLVED
//!             └──────────────────────close──────────────────────▶ CLOSED
//! Case:     OPEN ──assign reviewer──▶ IN_REVIEW ──resolve──▶ RESOLVED
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CaseId, ContractId, DisputeId, EvidenceId, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Closed,
}

impl DisputeStatus {
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::UnderReview => write!(f, "UNDER_REVIEW"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub contract: ContractId,
    pub client: OwnerId,
    pub freelancer: OwnerId,
    pub opened_by: OwnerId,
    pub reason: String,
    pub status: DisputeStatus,
    /// Open disputes past this deadline are escalated by the scheduler.
    pub timeout_at: DateTime<Utc>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    #[must_use]
    pub fn is_party(&self, owner: OwnerId) -> bool {
        owner == self.client || owner == self.freelancer
    }

    #[must_use]
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.status == DisputeStatus::Open && self.timeout_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Open,
    InReview,
    Resolved,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::InReview => write!(f, "IN_REVIEW"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationCase {
    pub id: CaseId,
    pub dispute: DisputeId,
    pub reviewer: Option<OwnerId>,
    /// Total fee charged across both parties.
    pub fee_charged: Decimal,
    pub status: CaseStatus,
    pub decision: Option<String>,
    /// Percent of the disputed funds awarded to the freelancer.
    pub freelancer_percentage: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A submitted piece of evidence. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub dispute: DisputeId,
    pub uploaded_by: OwnerId,
    pub file_url: String,
    pub description: String,
    /// Hex SHA-256 over the file url and description.
    pub digest: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn timeout_only_applies_to_open() {
        let now = Utc::now();
        let mut dispute = Dispute {
            id: DisputeId::new(),
            contract: ContractId::new(),
            client: OwnerId::new(),
            freelancer: OwnerId::new(),
            opened_by: OwnerId::new(),
            reason: "late delivery".into(),
            status: DisputeStatus::Open,
            timeout_at: now,
            resolution: None,
            created_at: now - Duration::days(7),
            resolved_at: None,
        };
        assert!(dispute.is_timed_out(now));
        assert!(!dispute.is_timed_out(now - Duration::seconds(1)));
        dispute.status = DisputeStatus::UnderReview;
        assert!(!dispute.is_timed_out(now));
    }

    #[test]
    fn final_states() {
        assert!(DisputeStatus::Resolved.is_final());
        assert!(DisputeStatus::Closed.is_final());
        assert!(!DisputeStatus::UnderReview.is_final());
        assert_eq!(DisputeStatus::UnderReview.to_string(), "UNDER_REVIEW");
        assert_eq!(CaseStatus::InReview.to_string(), "IN_REVIEW");
    }
}
