//! Manual repair for paid orders that never produced a subscription.
//!
//! Two modes behave the same except for when they back off: `Fix` leaves
//! users with any subscription alone, `Trigger` only backs off when the
//! latest subscription is `active`.

use serde::Serialize;
use time::{Date, OffsetDateTime};

use soloboard_shared::{OrderStatus, PlanTier, Subscription, SubscriptionStatus};

use crate::entitlement::EntitlementService;
use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;
use crate::subscriptions::{monthly_info, SubscriptionDraft, SubscriptionService, UpsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairMode {
    Fix,
    Trigger,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairedOrder {
    pub order_no: String,
    pub order_status: OrderStatus,
    pub amount: i64,
    pub user_id: String,
    pub tier: PlanTier,
    pub subscription_id: String,
    pub created: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_end: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RepairOutcome {
    Repaired(RepairedOrder),
    Skipped {
        message: String,
        subscription: Box<Subscription>,
    },
}

/// Same wall-clock time one calendar month later, clamped to month end.
pub fn add_one_month(at: OffsetDateTime) -> BillingResult<OffsetDateTime> {
    let date = at.date();
    let (year, month) = match date.month() {
        time::Month::December => (date.year() + 1, time::Month::January),
        m => (date.year(), m.next()),
    };
    let day = date.day().min(month.length(year));
    let next = Date::from_calendar_date(year, month, day)
        .map_err(|e| BillingError::Internal(format!("period end out of range: {}", e)))?;
    Ok(at.replace_date(next))
}

pub struct RepairService<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> RepairService<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    pub async fn repair_order(&self, order_no: &str, mode: RepairMode) -> BillingResult<RepairOutcome> {
        if order_no.trim().is_empty() {
            return Err(BillingError::InvalidInput("orderNo is required".to_string()));
        }

        let order = self
            .store
            .find_order_by_no(order_no)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Order {}", order_no)))?;

        if order.status != OrderStatus::Paid {
            return Err(BillingError::InvalidInput(format!(
                "Order {} is not paid (status {})",
                order_no, order.status
            )));
        }
        let user_id = order.user_id.clone().ok_or_else(|| {
            BillingError::InvalidInput(format!("Order {} has no user", order_no))
        })?;

        let existing = self.store.subscriptions_for_user(&user_id).await?;
        let blocking = match mode {
            RepairMode::Fix => existing.into_iter().next(),
            RepairMode::Trigger => existing
                .into_iter()
                .next()
                .filter(|s| s.status == SubscriptionStatus::Active),
        };
        if let Some(sub) = blocking {
            tracing::info!(
                order_no = %order_no,
                user_id = %user_id,
                subscription_id = %sub.id,
                mode = ?mode,
                "Repair skipped: user already has a subscription"
            );
            return Ok(RepairOutcome::Skipped {
                message: "User already has a subscription".to_string(),
                subscription: Box::new(sub),
            });
        }

        let amount = if order.amount > 0 {
            order.amount
        } else {
            PlanTier::Base.list_price_cents()
        };
        // manual repair always grants a paid tier
        let tier = match PlanTier::from_amount_cents(amount) {
            PlanTier::Free => PlanTier::Base,
            t => t,
        };

        let start = order.paid_at.unwrap_or_else(OffsetDateTime::now_utc);
        let end = add_one_month(start)?;
        let subscription_id = order.subscription_id.clone().unwrap_or_else(|| {
            format!(
                "creem_sub_{}",
                OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
            )
        });
        let suffix = match mode {
            RepairMode::Fix => "Manual Fix",
            RepairMode::Trigger => "Manual Trigger",
        };

        let mut info = monthly_info(
            amount,
            &order.currency,
            start,
            end,
            &format!("{} - {}", tier.plan_name(), suffix),
        );
        info.product_id = Some(tier.as_str().to_string());

        let outcome = SubscriptionService::new(self.store)
            .upsert(SubscriptionDraft {
                subscription_id: subscription_id.clone(),
                user_id: user_id.clone(),
                user_email: order.payment_email.clone().or(order.user_email.clone()),
                payment_user_id: order.payment_user_id.clone(),
                info,
                tier,
                raw: Some(serde_json::json!({
                    "manual_fix": true,
                    "mode": mode,
                    "orderNo": order.order_no,
                })),
                reference: Some(order.id.clone()),
            })
            .await?;

        EntitlementService::new(self.store)
            .propagate(&user_id, tier)
            .await?;
        self.store
            .link_order_subscription(&order.id, &subscription_id)
            .await?;

        tracing::info!(
            order_no = %order_no,
            user_id = %user_id,
            subscription_id = %subscription_id,
            tier = %tier,
            mode = ?mode,
            "Order repaired"
        );

        Ok(RepairOutcome::Repaired(RepairedOrder {
            order_no: order.order_no,
            order_status: order.status,
            amount,
            user_id,
            tier,
            subscription_id,
            created: outcome == UpsertOutcome::Created,
            current_period_end: end,
        }))
    }
}
