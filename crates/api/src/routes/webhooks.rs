//! Creem webhook endpoint
//!
//! Platform payments are reconciled by the billing crate. Store orders from a
//! user's own Creem shop come back here and are credited to one of their
//! monitored sites.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use soloboard_billing::{WebhookOutcome, SIGNATURE_HEADER};
use soloboard_monitor::{RevenueAttributor, StoreSale};

use crate::{error::ApiResult, state::AppState};

pub async fn creem_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let webhooks = &state.billing.webhooks;

    let event = webhooks.verify_event(&body, signature)?;
    let outcome = webhooks.handle_event(event).await?;

    match outcome {
        WebhookOutcome::SoloboardPayment {
            event_type,
            ignored,
        } => Ok(Json(json!({
            "received": true,
            "type": "soloboard_payment",
            "eventType": event_type,
            "ignored": ignored,
        }))),
        WebhookOutcome::Ignored { event_type } => Ok(Json(json!({
            "received": true,
            "type": "ignored",
            "eventType": event_type,
            "ignored": true,
        }))),
        WebhookOutcome::UserStoreOrder(order) => {
            let sale = StoreSale {
                amount: order.amount,
                currency: order.currency,
                site_id: order.site_id,
                transaction_id: order.transaction_id,
            };
            let attributed = RevenueAttributor::new(state.sites.as_ref())
                .attribute(&sale)
                .await?;

            Ok(Json(json!({
                "received": true,
                "type": "user_store_order",
                "siteId": attributed.as_ref().map(|a| a.site_id.as_str()),
                "revenueToday": attributed.as_ref().map(|a| a.revenue_today),
            })))
        }
    }
}

/// Liveness description for the webhook path.
pub async fn webhook_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "endpoint": "/api/webhooks/creem",
        "method": "POST",
        "signatureHeader": SIGNATURE_HEADER,
        "configured": state.billing.webhooks.is_configured(),
    }))
}
