//! Persistence seam for billing
//!
//! Every reconciliation step is a single read or write against this trait.
//! [`PgBillingStore`] backs production; [`crate::memory::InMemoryBillingStore`]
//! backs tests.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use soloboard_shared::{
    NewOrder, NewSubscription, NewUser, Order, PaymentWebhookEvent, PlanTier, Subscription,
    SubscriptionStatus, User,
};

use crate::error::{BillingError, BillingResult};

/// Postgres unique-violation SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// Payment fields written when an order transitions to `paid`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderPayment {
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_email: Option<String>,
    pub payment_user_name: Option<String>,
    pub payment_user_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub payment_result: Option<serde_json::Value>,
    pub subscription_id: Option<String>,
}

/// Status + period written on renewals, updates and duplicate deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    // Users
    async fn find_user(&self, user_id: &str) -> BillingResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<User>>;
    async fn insert_user(&self, user: NewUser) -> BillingResult<User>;
    /// Returns false when no such user exists.
    async fn set_user_plan(&self, user_id: &str, tier: PlanTier) -> BillingResult<bool>;

    // Orders
    async fn find_order(&self, order_id: &str) -> BillingResult<Option<Order>>;
    async fn find_order_by_no(&self, order_no: &str) -> BillingResult<Option<Order>>;
    /// Match on the stored checkout id or transaction id.
    async fn find_order_by_provider_ref(&self, reference: &str) -> BillingResult<Option<Order>>;
    async fn insert_order(&self, order: NewOrder) -> BillingResult<Order>;
    async fn set_order_checkout(&self, order_id: &str, checkout_id: &str) -> BillingResult<bool>;
    async fn mark_order_paid(&self, order_id: &str, payment: OrderPayment) -> BillingResult<bool>;
    async fn link_order_subscription(
        &self,
        order_id: &str,
        subscription_id: &str,
    ) -> BillingResult<bool>;
    async fn recent_orders(&self, limit: i64) -> BillingResult<Vec<Order>>;
    async fn orders_for_user(&self, user_id: &str) -> BillingResult<Vec<Order>>;

    // Subscriptions
    async fn find_subscription(&self, subscription_id: &str)
        -> BillingResult<Option<Subscription>>;
    /// Fails with [`BillingError::DuplicateSubscription`] when the id exists.
    async fn insert_subscription(&self, sub: NewSubscription) -> BillingResult<Subscription>;
    async fn update_subscription_state(
        &self,
        subscription_id: &str,
        state: SubscriptionState,
    ) -> BillingResult<bool>;
    /// Marks the row canceled and returns it.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> BillingResult<Option<Subscription>>;
    /// Newest first.
    async fn subscriptions_for_user(&self, user_id: &str) -> BillingResult<Vec<Subscription>>;
    async fn recent_subscriptions(&self, limit: i64) -> BillingResult<Vec<Subscription>>;

    // Webhook audit
    async fn record_webhook(
        &self,
        provider_event_id: Option<&str>,
        event_type: &str,
    ) -> BillingResult<Uuid>;
    async fn finish_webhook(
        &self,
        record_id: Uuid,
        processing_result: &str,
        error_message: Option<&str>,
    ) -> BillingResult<()>;
    async fn list_webhooks(
        &self,
        status_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<PaymentWebhookEvent>>;
}

/// Postgres-backed [`BillingStore`]
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, email_verified, plan_type, created_at, updated_at";

const ORDER_COLUMNS: &str = r#"id, order_no, user_id, user_email, status, amount, currency,
    product_id, plan_type, payment_session_id, transaction_id, payment_amount,
    payment_currency, payment_email, payment_user_name, payment_user_id, paid_at,
    payment_result, subscription_id, created_at, updated_at"#;

const SUBSCRIPTION_COLUMNS: &str = r#"id, subscription_no, user_id, user_email, status,
    payment_provider, payment_user_id, product_id, description, amount, currency,
    interval, interval_count, plan_type, plan_name, current_period_start,
    current_period_end, canceled_at, subscription_result, created_at, updated_at"#;

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn find_user(&self, user_id: &str) -> BillingResult<Option<User>> {
        let user = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> BillingResult<Option<User>> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1) LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> BillingResult<User> {
        let row = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, email_verified, plan_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(user.plan_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                BillingError::DuplicateUser(user.email.clone())
            }
            _ => BillingError::from(e),
        })?;
        Ok(row)
    }

    async fn set_user_plan(&self, user_id: &str, tier: PlanTier) -> BillingResult<bool> {
        let result =
            sqlx::query("UPDATE users SET plan_type = $1, updated_at = NOW() WHERE id = $2")
                .bind(tier)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_order(&self, order_id: &str) -> BillingResult<Option<Order>> {
        let order = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn find_order_by_no(&self, order_no: &str) -> BillingResult<Option<Order>> {
        let order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = $1"
        ))
        .bind(order_no)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn find_order_by_provider_ref(&self, reference: &str) -> BillingResult<Option<Order>> {
        let order = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE payment_session_id = $1 OR transaction_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn insert_order(&self, order: NewOrder) -> BillingResult<Order> {
        let row = sqlx::query_as(&format!(
            r#"
            INSERT INTO orders
                (id, order_no, user_id, user_email, status, amount, currency, product_id, plan_type)
            VALUES ($1, $2, $3, $4, 'created', $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(&order.id)
        .bind(&order.order_no)
        .bind(&order.user_id)
        .bind(&order.user_email)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.product_id)
        .bind(order.plan_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_order_checkout(&self, order_id: &str, checkout_id: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET payment_session_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(checkout_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_order_paid(&self, order_id: &str, payment: OrderPayment) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'paid',
                amount = COALESCE($1, amount),
                currency = COALESCE($2, currency),
                payment_amount = $3,
                payment_currency = $4,
                payment_email = $5,
                payment_user_name = $6,
                payment_user_id = $7,
                transaction_id = COALESCE($8, transaction_id),
                paid_at = COALESCE($9, NOW()),
                payment_result = $10,
                subscription_id = COALESCE($11, subscription_id),
                updated_at = NOW()
            WHERE id = $12
            "#,
        )
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.payment_amount)
        .bind(&payment.payment_currency)
        .bind(&payment.payment_email)
        .bind(&payment.payment_user_name)
        .bind(&payment.payment_user_id)
        .bind(&payment.transaction_id)
        .bind(payment.paid_at)
        .bind(&payment.payment_result)
        .bind(&payment.subscription_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn link_order_subscription(
        &self,
        order_id: &str,
        subscription_id: &str,
    ) -> BillingResult<bool> {
        let result =
            sqlx::query("UPDATE orders SET subscription_id = $1, updated_at = NOW() WHERE id = $2")
                .bind(subscription_id)
                .bind(order_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent_orders(&self, limit: i64) -> BillingResult<Vec<Order>> {
        let orders = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn orders_for_user(&self, user_id: &str) -> BillingResult<Vec<Order>> {
        let orders = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn find_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn insert_subscription(&self, sub: NewSubscription) -> BillingResult<Subscription> {
        sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions (
                id, subscription_no, user_id, user_email, status, payment_provider,
                payment_user_id, product_id, description, amount, currency, interval,
                interval_count, plan_type, plan_name, current_period_start,
                current_period_end, subscription_result
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(&sub.id)
        .bind(&sub.subscription_no)
        .bind(&sub.user_id)
        .bind(&sub.user_email)
        .bind(sub.status)
        .bind(&sub.payment_provider)
        .bind(&sub.payment_user_id)
        .bind(&sub.product_id)
        .bind(&sub.description)
        .bind(sub.amount)
        .bind(&sub.currency)
        .bind(&sub.interval)
        .bind(sub.interval_count)
        .bind(sub.plan_type)
        .bind(&sub.plan_name)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(&sub.subscription_result)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                BillingError::DuplicateSubscription(sub.id.clone())
            }
            _ => BillingError::from(e),
        })
    }

    async fn update_subscription_state(
        &self,
        subscription_id: &str,
        state: SubscriptionState,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $1,
                current_period_start = COALESCE($2, current_period_start),
                current_period_end = COALESCE($3, current_period_end),
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(state.status)
        .bind(state.current_period_start)
        .bind(state.current_period_end)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        canceled_at: OffsetDateTime,
    ) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', canceled_at = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(canceled_at)
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn subscriptions_for_user(&self, user_id: &str) -> BillingResult<Vec<Subscription>> {
        let subs = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn recent_subscriptions(&self, limit: i64) -> BillingResult<Vec<Subscription>> {
        let subs = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    async fn record_webhook(
        &self,
        provider_event_id: Option<&str>,
        event_type: &str,
    ) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO payment_webhook_events (id, provider_event_id, event_type, processing_result)
            VALUES ($1, $2, $3, 'processing')
            "#,
        )
        .bind(id)
        .bind(provider_event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish_webhook(
        &self,
        record_id: Uuid,
        processing_result: &str,
        error_message: Option<&str>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_webhook_events
            SET processing_result = $1, error_message = $2, finished_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(processing_result)
        .bind(error_message)
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_webhooks(
        &self,
        status_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<PaymentWebhookEvent>> {
        let records = match status_filter {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT id, provider_event_id, event_type, processing_result,
                           error_message, received_at, finished_at
                    FROM payment_webhook_events
                    WHERE processing_result = $1
                    ORDER BY received_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, provider_event_id, event_type, processing_result,
                           error_message, received_at, finished_at
                    FROM payment_webhook_events
                    ORDER BY received_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }
}
