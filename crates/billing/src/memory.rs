//! In-memory [`BillingStore`] for tests and local development.
//!
//! Mirrors the Postgres semantics the reconciliation relies on: unique
//! subscription ids, case-insensitive email lookup, newest-first listings.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use soloboard_shared::{
    NewOrder, NewSubscription, NewUser, Order, OrderStatus, PaymentWebhookEvent, PlanTier,
    Subscription, SubscriptionStatus, User,
};

use crate::error::{BillingError, BillingResult};
use crate::store::{BillingStore, OrderPayment, SubscriptionState};

#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    inner: Arc<RwLock<State>>,
}

/// Rows are kept in insertion order; listings reverse it.
#[derive(Default)]
struct State {
    users: Vec<User>,
    orders: Vec<Order>,
    subscriptions: Vec<Subscription>,
    webhooks: Vec<PaymentWebhookEvent>,
    late_user: Option<User>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed user row.
    pub async fn seed_user(&self, user: User) {
        self.inner.write().await.users.push(user);
    }

    pub async fn seed_order(&self, order: Order) {
        self.inner.write().await.orders.push(order);
    }

    pub async fn seed_subscription(&self, sub: Subscription) {
        self.inner.write().await.subscriptions.push(sub);
    }

    /// The next email lookup misses, then `user` is committed as if another
    /// writer won the race between that lookup and our insert.
    pub async fn seed_user_after_next_lookup(&self, user: User) {
        self.inner.write().await.late_user = Some(user);
    }

    pub async fn all_users(&self) -> Vec<User> {
        self.inner.read().await.users.clone()
    }

    pub async fn all_subscriptions(&self) -> Vec<Subscription> {
        self.inner.read().await.subscriptions.clone()
    }

    pub async fn all_webhooks(&self) -> Vec<PaymentWebhookEvent> {
        self.inner.read().await.webhooks.clone()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn find_user(&self, user_id: &str) -> BillingResult<Option<User>> {
        let state = self.inner.read().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<User>> {
        let mut state = self.inner.write().await;
        let found = state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned();
        if found.is_none() {
            if let Some(late) = state.late_user.take() {
                state.users.push(late);
            }
        }
        Ok(found)
    }

    async fn insert_user(&self, user: NewUser) -> BillingResult<User> {
        let mut state = self.inner.write().await;
        if state
            .users
            .iter()
            .any(|u| u.id == user.id || u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(BillingError::DuplicateUser(user.email));
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: user.id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            email_verified: user.email_verified,
            plan_type: user.plan_type,
            created_at: now,
            updated_at: now,
        };
        state.users.push(row.clone());
        Ok(row)
    }

    async fn set_user_plan(&self, user_id: &str, tier: PlanTier) -> BillingResult<bool> {
        let mut state = self.inner.write().await;
        match state.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.plan_type = tier;
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_order(&self, order_id: &str) -> BillingResult<Option<Order>> {
        let state = self.inner.read().await;
        Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn find_order_by_no(&self, order_no: &str) -> BillingResult<Option<Order>> {
        let state = self.inner.read().await;
        Ok(state.orders.iter().find(|o| o.order_no == order_no).cloned())
    }

    async fn find_order_by_provider_ref(&self, reference: &str) -> BillingResult<Option<Order>> {
        let state = self.inner.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .find(|o| {
                o.payment_session_id.as_deref() == Some(reference)
                    || o.transaction_id.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn insert_order(&self, order: NewOrder) -> BillingResult<Order> {
        let mut state = self.inner.write().await;
        if state.orders.iter().any(|o| o.order_no == order.order_no) {
            return Err(BillingError::InvalidInput(format!(
                "Order {} already exists",
                order.order_no
            )));
        }
        let now = OffsetDateTime::now_utc();
        let row = Order {
            id: order.id,
            order_no: order.order_no,
            user_id: Some(order.user_id),
            user_email: Some(order.user_email),
            status: OrderStatus::Created,
            amount: order.amount,
            currency: order.currency,
            product_id: order.product_id,
            plan_type: Some(order.plan_type),
            payment_session_id: None,
            transaction_id: None,
            payment_amount: None,
            payment_currency: None,
            payment_email: None,
            payment_user_name: None,
            payment_user_id: None,
            paid_at: None,
            payment_result: None,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(row.clone());
        Ok(row)
    }

    async fn set_order_checkout(&self, order_id: &str, checkout_id: &str) -> BillingResult<bool> {
        let mut state = self.inner.write().await;
        match state.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.payment_session_id = Some(checkout_id.to_string());
                order.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_order_paid(&self, order_id: &str, payment: OrderPayment) -> BillingResult<bool> {
        let mut state = self.inner.write().await;
        let Some(order) = state.orders.iter_mut().find(|o| o.id == order_id) else {
            return Ok(false);
        };
        let now = OffsetDateTime::now_utc();
        order.status = OrderStatus::Paid;
        if let Some(amount) = payment.amount {
            order.amount = amount;
        }
        if let Some(currency) = payment.currency {
            order.currency = currency;
        }
        order.payment_amount = payment.payment_amount;
        order.payment_currency = payment.payment_currency;
        order.payment_email = payment.payment_email;
        order.payment_user_name = payment.payment_user_name;
        order.payment_user_id = payment.payment_user_id;
        if payment.transaction_id.is_some() {
            order.transaction_id = payment.transaction_id;
        }
        order.paid_at = Some(payment.paid_at.unwrap_or(now));
        order.payment_result = payment.payment_result;
        if payment.subscription_id.is_some() {
            order.subscription_id = payment.subscription_id;
        }
        order.updated_at = now;
        Ok(true)
    }

    async fn link_order_subscription(
        &self,
        order_id: &str,
        subscription_id: &str,
    ) -> BillingResult<bool> {
        let mut state = self.inner.write().await;
        match state.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.subscription_id = Some(subscription_id.to_string());
                order.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recent_orders(&self, limit: i64) -> BillingResult<Vec<Order>> {
        let state = self.inner.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn orders_for_user(&self, user_id: &str) -> BillingResult<Vec<Order>> {
        let state = self.inner.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn find_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let state = self.inner.read().await;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.id == subscription_id)
            .cloned())
    }

    async fn insert_subscription(&self, sub: NewSubscription) -> BillingResult<Subscription> {
        let mut state = self.inner.write().await;
        if state.subscriptions.iter().any(|s| s.id == sub.id) {
            return Err(BillingError::DuplicateSubscription(sub.id));
        }
        let now = OffsetDateTime::now_utc();
        let row = Subscription {
            id: sub.id,
            subscription_no: sub.subscription_no,
            user_id: sub.user_id,
            user_email: sub.user_email,
            status: sub.status,
            payment_provider: sub.payment_provider,
            payment_user_id: sub.payment_user_id,
            product_id: sub.product_id,
            description: sub.description,
            amount: sub.amount,
            currency: sub.currency,
            interval: sub.interval,
            interval_count: sub.interval_count,
            plan_type: sub.plan_type,
            plan_name: sub.plan_name,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            canceled_at: None,
            subscription_result: sub.subscription_result,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.push(row.clone());
        Ok(row)
    }

    async fn update_subscription_state(
        &self,
        subscription_id: &str,
        update: SubscriptionState,
    ) -> BillingResult<bool> {
        let mut state = self.inner.write().await;
        let Some(sub) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        else {
            return Ok(false);
        };
        sub.status = update.status;
        if update.current_period_start.is_some() {
            sub.current_period_start = update.current_period_start;
        }
        if update.current_period_end.is_some() {
            sub.current_period_end = update.current_period_end;
        }
        sub.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> BillingResult<Option<Subscription>> {
        let mut state = self.inner.write().await;
        let Some(sub) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        else {
            return Ok(None);
        };
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(canceled_at);
        sub.updated_at = OffsetDateTime::now_utc();
        Ok(Some(sub.clone()))
    }

    async fn subscriptions_for_user(&self, user_id: &str) -> BillingResult<Vec<Subscription>> {
        let state = self.inner.read().await;
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_subscriptions(&self, limit: i64) -> BillingResult<Vec<Subscription>> {
        let state = self.inner.read().await;
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_webhook(
        &self,
        provider_event_id: Option<&str>,
        event_type: &str,
    ) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();
        self.inner.write().await.webhooks.push(PaymentWebhookEvent {
            id,
            provider_event_id: provider_event_id.map(str::to_string),
            event_type: event_type.to_string(),
            processing_result: "processing".to_string(),
            error_message: None,
            received_at: OffsetDateTime::now_utc(),
            finished_at: None,
        });
        Ok(id)
    }

    async fn finish_webhook(
        &self,
        record_id: Uuid,
        processing_result: &str,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        let mut state = self.inner.write().await;
        if let Some(record) = state.webhooks.iter_mut().find(|w| w.id == record_id) {
            record.processing_result = processing_result.to_string();
            record.error_message = error_message.map(str::to_string);
            record.finished_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn list_webhooks(
        &self,
        status_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<PaymentWebhookEvent>> {
        let state = self.inner.read().await;
        Ok(state
            .webhooks
            .iter()
            .rev()
            .filter(|w| status_filter.is_none_or(|s| w.processing_result == s))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
