//! Read-only views of records owned by external collaborators.
//!
//! Contracts and user profiles are managed elsewhere; the settlement core
//! only reads them to decide who gets paid and how much is withheld.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractKind {
    Fixed,
    Hourly,
    /// Employer-of-record engagement, paid through payroll.
    Eor,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "FIXED"),
            Self::Hourly => write!(f, "HOURLY"),
            Self::Eor => write!(f, "EOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Active,
    Paused,
    Disputed,
    Completed,
    Terminated,
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Contract fields the settlement core depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub id: ContractId,
    pub client_id: OwnerId,
    pub freelancer_id: OwnerId,
    /// Agency that receives a revenue share of every release.
    pub agency_id: Option<OwnerId>,
    /// Percent of each release routed to the agency.
    pub agency_split_percent: Option<Decimal>,
    pub kind: ContractKind,
    pub status: ContractStatus,
    pub hourly_rate: Option<Decimal>,
    /// EOR employer fee percent; the platform default applies when absent.
    pub employer_fee_percent: Option<Decimal>,
}

impl ContractInfo {
    /// Agency and split percent, when both are present and the split is positive.
    #[must_use]
    pub fn agency_split(&self) -> Option<(OwnerId, Decimal)> {
        match (self.agency_id, self.agency_split_percent) {
            (Some(agency), Some(pct)) if pct > Decimal::ZERO => Some((agency, pct)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_party(&self, owner: OwnerId) -> bool {
        owner == self.client_id || owner == self.freelancer_id
    }
}

/// Tax-relevant slice of a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: OwnerId,
    /// ISO country code used for tax lookup.
    pub jurisdiction: String,
    /// Whether the user has submitted verified tax documentation.
    pub tax_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ContractInfo {
        ContractInfo {
            id: ContractId::new(),
            client_id: OwnerId::new(),
            freelancer_id: OwnerId::new(),
            agency_id: None,
            agency_split_percent: None,
            kind: ContractKind::Fixed,
            status: ContractStatus::Active,
            hourly_rate: None,
            employer_fee_percent: None,
        }
    }

    #[test]
    fn agency_split_needs_both_fields() {
        let mut c = contract();
        assert!(c.agency_split().is_none());
        c.agency_id = Some(OwnerId::new());
        assert!(c.agency_split().is_none());
        c.agency_split_percent = Some(Decimal::ZERO);
        assert!(c.agency_split().is_none());
        c.agency_split_percent = Some(Decimal::new(20, 0));
        assert_eq!(c.agency_split().map(|(_, pct)| pct), Some(Decimal::new(20, 0)));
    }

    #[test]
    fn parties() {
        let c = contract();
        assert!(c.is_party(c.client_id));
        assert!(c.is_party(c.freelancer_id));
        assert!(!c.is_party(OwnerId::new()));
    }
}
