//! Subscription upsert, renewal and cancellation
//!
//! Rows are keyed by the provider subscription id. A redelivered
//! `checkout.success` hits the primary key and falls back to a plain
//! status/period update, so the final state matches the first delivery.

use time::OffsetDateTime;

use soloboard_shared::{NewSubscription, PlanTier, Subscription, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::events::SubscriptionInfo;
use crate::store::{BillingStore, SubscriptionState};

/// Whether the upsert inserted a row or fell back to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    UpdatedExisting,
}

/// Everything needed to write a subscription row.
#[derive(Debug, Clone)]
pub struct SubscriptionDraft {
    pub subscription_id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub payment_user_id: Option<String>,
    pub info: SubscriptionInfo,
    pub tier: PlanTier,
    pub raw: Option<serde_json::Value>,
    /// Short reference used in the generated subscription number.
    pub reference: Option<String>,
}

pub struct SubscriptionService<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> SubscriptionService<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    /// Insert the row, or update status/period if the id already exists.
    pub async fn upsert(&self, draft: SubscriptionDraft) -> BillingResult<UpsertOutcome> {
        let info = &draft.info;
        let new = NewSubscription {
            id: draft.subscription_id.clone(),
            subscription_no: subscription_no(draft.reference.as_deref()),
            user_id: draft.user_id.clone(),
            user_email: draft.user_email.clone(),
            status: info.status,
            payment_provider: "creem".to_string(),
            payment_user_id: draft.payment_user_id.clone(),
            product_id: Some(info.product_id.clone().unwrap_or_else(|| "unknown".to_string())),
            description: Some(
                info.description
                    .clone()
                    .unwrap_or_else(|| "Subscription".to_string()),
            ),
            amount: info.amount,
            currency: info.currency.clone(),
            interval: info.interval.clone(),
            interval_count: info.interval_count.max(1),
            plan_type: draft.tier,
            plan_name: draft.tier.plan_name().to_string(),
            current_period_start: info.current_period_start,
            current_period_end: info.current_period_end,
            subscription_result: draft.raw.clone(),
        };

        match self.store.insert_subscription(new).await {
            Ok(sub) => {
                tracing::info!(
                    subscription_id = %sub.id,
                    subscription_no = %sub.subscription_no,
                    user_id = %sub.user_id,
                    tier = %sub.plan_type,
                    "Subscription created"
                );
                Ok(UpsertOutcome::Created)
            }
            Err(BillingError::DuplicateSubscription(id)) => {
                tracing::warn!(
                    subscription_id = %id,
                    "Subscription already exists, updating status and period instead"
                );
                self.store
                    .update_subscription_state(&id, state_of(info))
                    .await?;
                Ok(UpsertOutcome::UpdatedExisting)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a renewal or provider-side update. Unknown ids are logged and
    /// ignored.
    pub async fn apply_state(
        &self,
        subscription_id: &str,
        info: &SubscriptionInfo,
    ) -> BillingResult<bool> {
        let updated = self
            .store
            .update_subscription_state(subscription_id, state_of(info))
            .await?;
        if updated {
            tracing::info!(
                subscription_id = %subscription_id,
                status = %info.status,
                "Subscription state updated"
            );
        } else {
            tracing::warn!(
                subscription_id = %subscription_id,
                "Update for unknown subscription ignored"
            );
        }
        Ok(updated)
    }

    /// Mark canceled. Returns the row so the caller can find its owner.
    pub async fn cancel(
        &self,
        subscription_id: &str,
        canceled_at: Option<OffsetDateTime>,
    ) -> BillingResult<Option<Subscription>> {
        let at = canceled_at.unwrap_or_else(OffsetDateTime::now_utc);
        let sub = self.store.cancel_subscription(subscription_id, at).await?;
        match &sub {
            Some(s) => tracing::info!(
                subscription_id = %s.id,
                user_id = %s.user_id,
                "Subscription canceled"
            ),
            None => tracing::warn!(
                subscription_id = %subscription_id,
                "Cancellation for unknown subscription ignored"
            ),
        }
        Ok(sub)
    }

    /// Latest subscription whose status still grants its tier.
    pub async fn active_for_user(&self, user_id: &str) -> BillingResult<Option<Subscription>> {
        let subs = self.store.subscriptions_for_user(user_id).await?;
        Ok(subs.into_iter().find(|s| s.status.is_entitled()))
    }
}

fn state_of(info: &SubscriptionInfo) -> SubscriptionState {
    SubscriptionState {
        status: info.status,
        current_period_start: info.current_period_start,
        current_period_end: info.current_period_end,
    }
}

fn subscription_no(reference: Option<&str>) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let tag: String = reference
        .map(|r| r.chars().take(8).collect())
        .unwrap_or_else(|| "webhook".to_string());
    format!("SUB-{}-{}", millis, tag)
}

/// Info for a manually created monthly subscription.
pub fn monthly_info(
    amount: i64,
    currency: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
    description: &str,
) -> SubscriptionInfo {
    SubscriptionInfo {
        status: SubscriptionStatus::Active,
        amount,
        currency: currency.to_string(),
        interval: "month".to_string(),
        interval_count: 1,
        current_period_start: Some(start),
        current_period_end: Some(end),
        product_id: None,
        description: Some(description.to_string()),
        canceled_at: None,
    }
}
