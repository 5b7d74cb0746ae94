//! Creem webhook handling
//!
//! Verifies the `creem-signature` header, classifies the delivery as one of
//! our own payments or a customer's store order, and runs the reconciliation
//! pipeline for our own payments: identity, order, subscription, entitlement.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use soloboard_shared::{PaymentWebhookEvent, PlanTier};

use crate::entitlement::EntitlementService;
use crate::error::{BillingError, BillingResult};
use crate::events::{PaymentEvent, PaymentEventType};
use crate::identity::IdentityResolver;
use crate::orders::OrderService;
use crate::store::BillingStore;
use crate::subscriptions::{SubscriptionDraft, SubscriptionService, UpsertOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "creem-signature";

/// Lowercase hex HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Internal("Invalid webhook signing secret".to_string()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// What a processed delivery turned out to be.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// One of our own subscription payments.
    SoloboardPayment {
        #[serde(rename = "eventType")]
        event_type: String,
        ignored: bool,
    },
    /// A sale in a customer's own Creem store, to be credited to their site.
    UserStoreOrder(StoreOrder),
    /// Store traffic that is not a completed sale.
    Ignored {
        #[serde(rename = "eventType")]
        event_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOrder {
    pub amount: i64,
    pub currency: String,
    pub site_id: Option<String>,
    pub transaction_id: Option<String>,
    pub customer_email: Option<String>,
}

/// Result of reconciling one `checkout.success`.
#[derive(Debug, Clone)]
pub struct CheckoutReconciliation {
    pub user_id: String,
    pub user_created: bool,
    pub order_id: Option<String>,
    pub subscription_id: Option<String>,
    pub tier: Option<PlanTier>,
    pub upsert: Option<UpsertOutcome>,
}

/// Webhook handler for Creem events
#[derive(Clone)]
pub struct WebhookHandler {
    store: Arc<dyn BillingStore>,
    signing_secret: Option<String>,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn BillingStore>, signing_secret: Option<String>) -> Self {
        Self {
            store,
            signing_secret,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.signing_secret.is_some()
    }

    /// Verify the signature over the raw body and parse the event.
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<PaymentEvent> {
        let secret = self
            .signing_secret
            .as_deref()
            .ok_or(BillingError::NotConfigured)?;

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                tracing::warn!("Webhook rejected: missing signature header");
                BillingError::WebhookSignatureInvalid
            })?;

        let expected = sign_payload(secret, payload)?;
        let matches: bool = expected
            .as_bytes()
            .ct_eq(signature.to_ascii_lowercase().as_bytes())
            .into();
        if !matches {
            tracing::warn!(
                payload_len = payload.len(),
                "Webhook rejected: signature mismatch"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event = PaymentEvent::from_creem_payload(payload)?;
        tracing::info!(
            event_type = %event.event_type,
            event_id = ?event.event_id,
            "Webhook signature verified"
        );
        Ok(event)
    }

    /// Handle a verified event.
    ///
    /// Store orders are returned to the caller untouched. Our own payments
    /// are reconciled and recorded in the webhook audit table.
    pub async fn handle_event(&self, event: PaymentEvent) -> BillingResult<WebhookOutcome> {
        if !event.session.metadata.is_platform_payment() {
            let completed_sale = matches!(
                event.event_type,
                PaymentEventType::CheckoutSuccess | PaymentEventType::PaymentSuccess
            );
            let payment = match event.session.payment_info.clone() {
                Some(payment) if completed_sale => payment,
                _ => {
                    tracing::info!(
                        event_type = %event.event_type.as_str(),
                        "Ignoring store event that is not a completed sale"
                    );
                    return Ok(WebhookOutcome::Ignored {
                        event_type: event.event_type.as_str().to_string(),
                    });
                }
            };
            tracing::info!(
                amount = payment.amount,
                transaction_id = ?payment.transaction_id,
                "Detected user store order"
            );
            return Ok(WebhookOutcome::UserStoreOrder(StoreOrder {
                amount: payment.payment_amount.unwrap_or(payment.amount),
                currency: payment.currency,
                site_id: event.session.metadata.site_id(),
                transaction_id: payment.transaction_id,
                customer_email: payment.payment_email,
            }));
        }

        let event_type = event.event_type.to_string();
        let record_id = self
            .store
            .record_webhook(event.event_id.as_deref(), &event_type)
            .await?;

        tracing::info!(
            event_type = %event_type,
            record_id = %record_id,
            "Processing SoloBoard payment webhook"
        );

        let result = self.process_event_internal(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(true) => ("success", None),
            Ok(false) => ("ignored", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = self
            .store
            .finish_webhook(record_id, processing_result, error_message.as_deref())
            .await
        {
            tracing::warn!(
                record_id = %record_id,
                error = %e,
                "First attempt to update webhook audit record failed, retrying..."
            );
            if let Err(retry_err) = self
                .store
                .finish_webhook(record_id, processing_result, error_message.as_deref())
                .await
            {
                tracing::error!(
                    record_id = %record_id,
                    event_type = %event_type,
                    processing_result = %processing_result,
                    first_error = %e,
                    retry_error = %retry_err,
                    "Failed to update webhook audit record after retry"
                );
            }
        }

        let handled = result?;
        Ok(WebhookOutcome::SoloboardPayment {
            event_type,
            ignored: !handled,
        })
    }

    /// Returns false when the event type has no handler.
    async fn process_event_internal(&self, event: &PaymentEvent) -> BillingResult<bool> {
        match &event.event_type {
            PaymentEventType::CheckoutSuccess => {
                self.handle_checkout_success(event).await?;
            }
            PaymentEventType::PaymentSuccess => {
                self.handle_subscription_state(event, "renewed").await?;
            }
            PaymentEventType::SubscriptionUpdated => {
                self.handle_subscription_state(event, "updated").await?;
            }
            PaymentEventType::SubscriptionCanceled => {
                self.handle_subscription_canceled(event).await?;
            }
            PaymentEventType::Unknown(raw) => {
                tracing::info!(
                    event_type = %raw,
                    event_id = ?event.event_id,
                    "Received unhandled Creem event type - no handler configured"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// First payment: identity -> order -> subscription -> user tier.
    pub async fn handle_checkout_success(
        &self,
        event: &PaymentEvent,
    ) -> BillingResult<CheckoutReconciliation> {
        let session = &event.session;
        let store = self.store.as_ref();

        let identity = IdentityResolver::new(store).resolve(session).await?;
        let order_id = identity.order.as_ref().map(|o| o.id.clone());

        if let Some(order) = &identity.order {
            OrderService::new(store).mark_paid(order, session).await?;
        }

        let mut reconciliation = CheckoutReconciliation {
            user_id: identity.user_id.clone(),
            user_created: identity.user_created,
            order_id: order_id.clone(),
            subscription_id: session.subscription_id.clone(),
            tier: None,
            upsert: None,
        };

        let (Some(info), Some(subscription_id)) =
            (&session.subscription_info, &session.subscription_id)
        else {
            tracing::warn!(
                user_id = %identity.user_id,
                order_id = ?order_id,
                "No subscription info in payment session"
            );
            return Ok(reconciliation);
        };

        let tier = PlanTier::from_amount_cents(info.amount);
        let payment = session.payment_info.as_ref();
        let outcome = SubscriptionService::new(store)
            .upsert(SubscriptionDraft {
                subscription_id: subscription_id.clone(),
                user_id: identity.user_id.clone(),
                user_email: payment.and_then(|p| p.payment_email.clone()),
                payment_user_id: payment.and_then(|p| p.payment_user_id.clone()),
                info: info.clone(),
                tier,
                raw: Some(session.raw.clone()),
                reference: order_id.clone(),
            })
            .await?;

        EntitlementService::new(store)
            .propagate(&identity.user_id, tier)
            .await?;

        if let Some(order_id) = &order_id {
            store.link_order_subscription(order_id, subscription_id).await?;
        }

        tracing::info!(
            user_id = %identity.user_id,
            subscription_id = %subscription_id,
            tier = %tier,
            outcome = ?outcome,
            "Checkout reconciled"
        );

        reconciliation.tier = Some(tier);
        reconciliation.upsert = Some(outcome);
        Ok(reconciliation)
    }

    async fn handle_subscription_state(
        &self,
        event: &PaymentEvent,
        action: &str,
    ) -> BillingResult<()> {
        let session = &event.session;
        let (Some(info), Some(subscription_id)) =
            (&session.subscription_info, &session.subscription_id)
        else {
            tracing::warn!(
                event_type = %event.event_type,
                "Subscription event without subscription info, nothing to update"
            );
            return Ok(());
        };

        if SubscriptionService::new(self.store.as_ref())
            .apply_state(subscription_id, info)
            .await?
        {
            tracing::info!(subscription_id = %subscription_id, action = %action, "Subscription {}", action);
        }
        Ok(())
    }

    async fn handle_subscription_canceled(&self, event: &PaymentEvent) -> BillingResult<()> {
        let session = &event.session;
        let Some(subscription_id) = &session.subscription_id else {
            tracing::warn!("Cancellation without subscription id, nothing to cancel");
            return Ok(());
        };
        let canceled_at = session
            .subscription_info
            .as_ref()
            .and_then(|i| i.canceled_at);

        let store = self.store.as_ref();
        if let Some(sub) = SubscriptionService::new(store)
            .cancel(subscription_id, canceled_at)
            .await?
        {
            EntitlementService::new(store)
                .downgrade_to_free(&sub.user_id)
                .await?;
            tracing::info!(
                user_id = %sub.user_id,
                subscription_id = %subscription_id,
                "Subscription canceled and user downgraded"
            );
        }
        Ok(())
    }

    /// List recorded deliveries, newest first.
    pub async fn list_webhooks(
        &self,
        status_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<PaymentWebhookEvent>> {
        self.store.list_webhooks(status_filter, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBillingStore;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn handler() -> (WebhookHandler, InMemoryBillingStore) {
        let store = InMemoryBillingStore::new();
        (
            WebhookHandler::new(Arc::new(store.clone()), Some(SECRET.to_string())),
            store,
        )
    }

    fn body() -> Vec<u8> {
        json!({
            "eventType": "subscription.update",
            "object": { "id": "sub_1", "object": "subscription", "status": "active" }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn valid_signature_is_accepted() {
        let (handler, _) = handler();
        let payload = body();
        let sig = sign_payload(SECRET, &payload).unwrap();
        let event = handler.verify_event(&payload, Some(&sig)).unwrap();
        assert_eq!(event.event_type, PaymentEventType::SubscriptionUpdated);
    }

    #[test]
    fn uppercase_hex_signature_is_accepted() {
        let (handler, _) = handler();
        let payload = body();
        let sig = sign_payload(SECRET, &payload).unwrap().to_uppercase();
        assert!(handler.verify_event(&payload, Some(&sig)).is_ok());
    }

    #[test]
    fn missing_or_wrong_signature_is_rejected() {
        let (handler, _) = handler();
        let payload = body();
        assert!(matches!(
            handler.verify_event(&payload, None),
            Err(BillingError::WebhookSignatureInvalid)
        ));
        assert!(matches!(
            handler.verify_event(&payload, Some("")),
            Err(BillingError::WebhookSignatureInvalid)
        ));
        let wrong = sign_payload("other", &payload).unwrap();
        assert!(matches!(
            handler.verify_event(&payload, Some(&wrong)),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let (handler, _) = handler();
        let payload = body();
        let sig = sign_payload(SECRET, &payload).unwrap();
        let mut tampered = payload.clone();
        tampered.push(b' ');
        assert!(handler.verify_event(&tampered, Some(&sig)).is_err());
    }

    #[test]
    fn unconfigured_handler_refuses() {
        let handler = WebhookHandler::new(Arc::new(InMemoryBillingStore::new()), None);
        assert!(matches!(
            handler.verify_event(b"{}", Some("abc")),
            Err(BillingError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn unknown_event_is_recorded_as_ignored() {
        let (handler, store) = handler();
        let payload = json!({
            "id": "evt_refund",
            "eventType": "refund.created",
            "object": { "metadata": { "userId": "u1" } }
        })
        .to_string();
        let event = PaymentEvent::from_creem_payload(payload.as_bytes()).unwrap();
        let outcome = handler.handle_event(event).await.unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::SoloboardPayment { ignored: true, .. }
        ));
        let audit = store.all_webhooks().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].processing_result, "ignored");
        assert_eq!(audit[0].provider_event_id.as_deref(), Some("evt_refund"));
    }

    #[tokio::test]
    async fn store_order_is_returned_without_audit() {
        let (handler, store) = handler();
        let payload = json!({
            "eventType": "checkout.completed",
            "object": {
                "id": "ch_shop",
                "order": { "transaction": "txn_shop", "amount": 2500, "currency": "EUR", "amount_paid": 2500 },
                "customer": { "email": "shopper@example.com" },
                "metadata": { "site_id": "site_1" }
            }
        })
        .to_string();
        let event = PaymentEvent::from_creem_payload(payload.as_bytes()).unwrap();
        let outcome = handler.handle_event(event).await.unwrap();

        match outcome {
            WebhookOutcome::UserStoreOrder(order) => {
                assert_eq!(order.amount, 2500);
                assert_eq!(order.currency, "EUR");
                assert_eq!(order.site_id.as_deref(), Some("site_1"));
            }
            other => panic!("expected store order, got {:?}", other),
        }
        assert!(store.all_webhooks().await.is_empty());
    }

    #[tokio::test]
    async fn store_cancellation_is_not_a_sale() {
        let (handler, store) = handler();
        let payload = json!({
            "eventType": "subscription.canceled",
            "object": {
                "id": "sub_shop",
                "object": "subscription",
                "status": "canceled",
                "product": { "price": 4900 }
            }
        })
        .to_string();
        let event = PaymentEvent::from_creem_payload(payload.as_bytes()).unwrap();
        let outcome = handler.handle_event(event).await.unwrap();

        match outcome {
            WebhookOutcome::Ignored { event_type } => {
                assert_eq!(event_type, "subscription.canceled")
            }
            other => panic!("expected ignored, got {:?}", other),
        }
        assert!(store.all_webhooks().await.is_empty());
    }

    #[tokio::test]
    async fn store_checkout_without_order_is_ignored() {
        let (handler, _) = handler();
        let payload = json!({
            "eventType": "checkout.completed",
            "object": { "id": "ch_shop", "metadata": { "site_id": "site_1" } }
        })
        .to_string();
        let event = PaymentEvent::from_creem_payload(payload.as_bytes()).unwrap();
        assert!(matches!(
            handler.handle_event(event).await.unwrap(),
            WebhookOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn envelope_without_object_is_ignored() {
        let (handler, _) = handler();
        for payload in [
            json!({ "eventType": "checkout.completed" }),
            json!({ "eventType": "refund.created", "object": null }),
        ] {
            let event = PaymentEvent::from_creem_payload(payload.to_string().as_bytes()).unwrap();
            assert!(event.session.payment_info.is_none());
            assert!(matches!(
                handler.handle_event(event).await.unwrap(),
                WebhookOutcome::Ignored { .. }
            ));
        }
    }

    #[tokio::test]
    async fn failed_processing_is_recorded_as_error() {
        let (handler, store) = handler();
        // platform payment with an order reference but no way to find the user
        let payload = json!({
            "eventType": "checkout.completed",
            "object": { "id": "ch_1", "metadata": { "orderId": "o1" } }
        })
        .to_string();
        let event = PaymentEvent::from_creem_payload(payload.as_bytes()).unwrap();
        let err = handler.handle_event(event).await.unwrap_err();
        assert!(matches!(err, BillingError::IdentityUnresolved(_)));

        let audit = store.all_webhooks().await;
        assert_eq!(audit[0].processing_result, "error");
        assert!(audit[0].error_message.is_some());
        assert!(audit[0].finished_at.is_some());
    }
}
