//! Hosted checkout for plan purchases
//!
//! Creates a `created` order at the tier's list price, opens a Creem checkout
//! carrying the order/user references in metadata, and stores the checkout
//! id on the order so the webhook can find it again.

use std::sync::Arc;

use serde::Serialize;

use soloboard_shared::{PlanTier, User};

use crate::client::{CheckoutCustomer, CheckoutRequest, CreemClient};
use crate::error::{BillingError, BillingResult};
use crate::events::PLATFORM_APP_NAME;
use crate::orders::OrderService;
use crate::store::BillingStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub checkout_id: String,
    pub order_id: String,
    pub order_no: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn BillingStore>,
    creem: Option<CreemClient>,
    app_url: String,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn BillingStore>, creem: Option<CreemClient>, app_url: String) -> Self {
        Self {
            store,
            creem,
            app_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.creem.is_some()
    }

    pub async fn create_checkout(
        &self,
        user: &User,
        tier: PlanTier,
    ) -> BillingResult<CheckoutResponse> {
        if !tier.is_paid() {
            return Err(BillingError::InvalidInput(
                "Only base and pro plans can be purchased".to_string(),
            ));
        }
        let creem = self.creem.as_ref().ok_or(BillingError::NotConfigured)?;
        let product_id = creem
            .config()
            .product_ids
            .for_tier(tier)
            .ok_or_else(|| {
                BillingError::InvalidInput(format!("No Creem product configured for {}", tier))
            })?
            .to_string();

        let order = OrderService::new(self.store.as_ref())
            .create_for_plan(&user.id, &user.email, tier, Some(product_id.clone()))
            .await?;

        let request = CheckoutRequest {
            product_id,
            request_id: order.order_no.clone(),
            success_url: Some(format!(
                "{}/payment/success?order_no={}",
                self.app_url.trim_end_matches('/'),
                order.order_no
            )),
            customer: Some(CheckoutCustomer {
                email: user.email.clone(),
            }),
            metadata: serde_json::json!({
                "userId": user.id,
                "orderId": order.id,
                "order_no": order.order_no,
                "userEmail": user.email,
                "app_name": PLATFORM_APP_NAME,
            }),
        };

        let session = creem.create_checkout(&request).await?;
        self.store.set_order_checkout(&order.id, &session.id).await?;

        tracing::info!(
            user_id = %user.id,
            order_no = %order.order_no,
            checkout_id = %session.id,
            tier = %tier,
            "Checkout session created"
        );

        Ok(CheckoutResponse {
            checkout_url: session.checkout_url,
            checkout_id: session.id,
            order_id: order.id,
            order_no: order.order_no,
        })
    }
}
