//! Order creation and the `created -> paid` transition.

use rand::Rng;
use time::OffsetDateTime;

use soloboard_shared::{NewOrder, Order, PlanTier};

use crate::error::BillingResult;
use crate::events::PaymentSession;
use crate::store::{BillingStore, OrderPayment};

/// `ORD-<millis>-<6 random alphanumerics>`
pub fn generate_order_no() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", millis, suffix)
}

pub struct OrderService<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> OrderService<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    /// New order in `created` state at the tier's list price.
    pub async fn create_for_plan(
        &self,
        user_id: &str,
        user_email: &str,
        tier: PlanTier,
        product_id: Option<String>,
    ) -> BillingResult<Order> {
        let order = self
            .store
            .insert_order(NewOrder {
                id: soloboard_shared::models::new_id(),
                order_no: generate_order_no(),
                user_id: user_id.to_string(),
                user_email: user_email.to_string(),
                amount: tier.list_price_cents(),
                currency: "USD".to_string(),
                product_id,
                plan_type: tier,
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            order_no = %order.order_no,
            user_id = %user_id,
            tier = %tier,
            "Created order"
        );
        Ok(order)
    }

    /// Mark an order paid with the delivery's payment fields.
    ///
    /// Returns false (and logs) when the order row is gone.
    pub async fn mark_paid(&self, order: &Order, session: &PaymentSession) -> BillingResult<bool> {
        let payment = session.payment_info.clone().unwrap_or_default();
        let update = OrderPayment {
            amount: session.payment_info.as_ref().map(|p| p.amount),
            currency: session.payment_info.as_ref().map(|p| p.currency.clone()),
            payment_amount: payment.payment_amount,
            payment_currency: payment.payment_currency,
            payment_email: payment.payment_email,
            payment_user_name: payment.payment_user_name,
            payment_user_id: payment.payment_user_id,
            transaction_id: payment.transaction_id,
            paid_at: payment.paid_at,
            payment_result: Some(session.raw.clone()),
            subscription_id: session.subscription_id.clone(),
        };

        let updated = self.store.mark_order_paid(&order.id, update).await?;
        if updated {
            tracing::info!(
                order_id = %order.id,
                order_no = %order.order_no,
                "Order marked paid"
            );
        } else {
            tracing::warn!(
                order_id = %order.id,
                "Order vanished before it could be marked paid"
            );
        }
        Ok(updated)
    }
}
