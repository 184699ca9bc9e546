//! Recurring subscriptions billed from the wallet.
//!
//! A renewal charges the owner and replaces the due record with a fresh
//! `Active` one; the old record becomes `Expired`. A renewal the wallet
//! cannot cover marks the record `PastDue` instead.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use paysettle_types::constants::SUBSCRIPTION_PERIOD_DAYS;
use paysettle_types::money::ensure_positive;
use paysettle_types::{
    OwnerId, PaysettleError, Result, Subscription, SubscriptionId, SubscriptionStatus,
    TransactionKind, TxDraft,
};
use rust_decimal::Decimal;

use crate::api::BatchReport;
use crate::controller::SettlementController;
use crate::ports::NotificationKind;

#[derive(Debug, Default)]
pub(crate) struct SubscriptionBook {
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
}

impl SettlementController {
    /// Debit `price` from the owner and credit the treasury.
    fn charge_subscription(
        &self,
        owner: OwnerId,
        plan: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let treasury = OwnerId::treasury();
        self.ledger.atomic(&[owner, treasury], now, |unit| {
            unit.debit(
                owner,
                TxDraft::new(TransactionKind::SubscriptionFee, price)
                    .reference(plan)
                    .description(format!("{plan} subscription")),
            )?;
            unit.credit(
                treasury,
                TxDraft::new(TransactionKind::PlatformFee, price)
                    .reference(plan)
                    .description(format!("{plan} subscription")),
            )?;
            Ok(())
        })
    }

    /// Start a subscription, charging the first period up front.
    pub fn create_subscription(&self, owner: OwnerId, plan: &str, price: Decimal) -> Result<Subscription> {
        let price = ensure_positive(price)?;
        if plan.trim().is_empty() {
            return Err(PaysettleError::invalid_request("plan name is empty"));
        }
        let now = self.clock.now();
        self.charge_subscription(owner, plan, price, now)?;
        let subscription = Subscription {
            id: SubscriptionId::new(),
            owner,
            plan: plan.to_string(),
            price,
            status: SubscriptionStatus::Active,
            next_billing_at: now + Duration::days(SUBSCRIPTION_PERIOD_DAYS),
            created_at: now,
            renewed_from: None,
        };
        self.subscriptions
            .subscriptions
            .lock()
            .insert(subscription.id, subscription.clone());
        tracing::info!(owner = %owner, plan = %plan, price = %price, "subscription created");
        Ok(subscription)
    }

    /// Renew a due subscription.
    ///
    /// # Errors
    /// `InsufficientFunds` when the wallet cannot pay; the record is then
    /// `PastDue`.
    pub async fn renew_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        let now = self.clock.now();
        let charged = {
            let mut subscriptions = self.subscriptions.subscriptions.lock();
            let current = subscriptions
                .get_mut(&id)
                .ok_or(PaysettleError::SubscriptionNotFound(id))?;
            if !current.is_due(now) {
                return Err(PaysettleError::invalid_request(format!(
                    "subscription {id} is {} and due at {}",
                    current.status, current.next_billing_at
                )));
            }
            match self.charge_subscription(current.owner, &current.plan, current.price, now) {
                Ok(()) => {
                    current.status = SubscriptionStatus::Expired;
                    let renewed = Subscription {
                        id: SubscriptionId::new(),
                        owner: current.owner,
                        plan: current.plan.clone(),
                        price: current.price,
                        status: SubscriptionStatus::Active,
                        next_billing_at: current.next_billing_at
                            + Duration::days(SUBSCRIPTION_PERIOD_DAYS),
                        created_at: now,
                        renewed_from: Some(id),
                    };
                    subscriptions.insert(renewed.id, renewed.clone());
                    Ok(renewed)
                }
                Err(err) => {
                    current.status = SubscriptionStatus::PastDue;
                    Err((current.owner, err))
                }
            }
        };

        match charged {
            Ok(renewed) => {
                tracing::info!(owner = %renewed.owner, plan = %renewed.plan, "subscription renewed");
                self.notify(renewed.owner, NotificationKind::SubscriptionRenewed, format!("{} renewed", renewed.plan))
                    .await;
                Ok(renewed)
            }
            Err((owner, err)) => {
                tracing::warn!(owner = %owner, subscription = %id, error = %err, "subscription renewal failed");
                self.notify(owner, NotificationKind::SubscriptionPastDue, "Subscription payment failed")
                    .await;
                Err(err)
            }
        }
    }

    pub fn cancel_subscription(&self, owner: OwnerId, id: SubscriptionId) -> Result<Subscription> {
        let mut subscriptions = self.subscriptions.subscriptions.lock();
        let subscription = subscriptions
            .get_mut(&id)
            .ok_or(PaysettleError::SubscriptionNotFound(id))?;
        if subscription.owner != owner {
            return Err(PaysettleError::NotAParticipant(owner));
        }
        subscription.status = SubscriptionStatus::Cancelled;
        Ok(subscription.clone())
    }

    pub fn subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.subscriptions
            .subscriptions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::SubscriptionNotFound(id))
    }

    #[must_use]
    pub fn subscriptions_of(&self, owner: OwnerId) -> Vec<Subscription> {
        let mut list: Vec<_> = self
            .subscriptions
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        list.sort_by_key(|s| s.created_at);
        list
    }

    /// Renew every subscription whose billing date has passed.
    pub async fn run_subscription_renewals(&self) -> BatchReport {
        let now = self.clock.now();
        let due: Vec<SubscriptionId> = self
            .subscriptions
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.is_due(now))
            .map(|s| s.id)
            .collect();
        let mut report = BatchReport::default();
        for id in due {
            match self.renew_subscription(id).await {
                Ok(_) => report.processed += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}
