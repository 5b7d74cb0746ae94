// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Payment Reconciliation
//!
//! End-to-end runs of signed deliveries through the webhook handler against
//! the in-memory store:
//! - Checkout reconciliation (BILL-C01 to BILL-C06)
//! - Cancellation (BILL-X01 to BILL-X03)
//! - Renewals and updates (BILL-U01 to BILL-U02)
//! - Manual repair (BILL-R01 to BILL-R05)
//! - Diagnostics (BILL-D01 to BILL-D04)

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use time::OffsetDateTime;

    use soloboard_shared::{
        NewUser, Order, OrderStatus, PlanTier, Subscription, SubscriptionStatus, User,
    };

    use crate::memory::InMemoryBillingStore;
    use crate::store::BillingStore;
    use crate::webhooks::{sign_payload, WebhookHandler, WebhookOutcome};
    use crate::error::BillingResult;

    pub const SECRET: &str = "whsec_edge_cases";

    pub fn handler(store: &InMemoryBillingStore) -> WebhookHandler {
        WebhookHandler::new(Arc::new(store.clone()), Some(SECRET.to_string()))
    }

    /// Sign, verify and handle a delivery the way the HTTP route does.
    pub async fn deliver(handler: &WebhookHandler, payload: &Value) -> BillingResult<WebhookOutcome> {
        let body = payload.to_string().into_bytes();
        let sig = sign_payload(SECRET, &body).unwrap();
        let event = handler.verify_event(&body, Some(&sig))?;
        handler.handle_event(event).await
    }

    pub fn checkout_completed(sub_id: &str, amount: i64, metadata: Value, email: &str) -> Value {
        json!({
            "id": format!("evt_{}", sub_id),
            "eventType": "checkout.completed",
            "object": {
                "id": format!("ch_{}", sub_id),
                "object": "checkout",
                "customer": { "id": "cust_1", "email": email, "name": "" },
                "order": {
                    "id": "ord_provider",
                    "transaction": format!("txn_{}", sub_id),
                    "amount": amount,
                    "currency": "USD",
                    "amount_paid": amount
                },
                "subscription": {
                    "id": sub_id,
                    "status": "active",
                    "current_period_start_date": "2025-03-01T00:00:00Z",
                    "current_period_end_date": "2025-04-01T00:00:00Z"
                },
                "product": {
                    "id": "prod_x",
                    "description": "Plan",
                    "price": amount,
                    "currency": "USD",
                    "billing_period": "every-month"
                },
                "metadata": metadata
            }
        })
    }

    pub fn subscription_event(event_type: &str, sub_id: &str, status: &str) -> Value {
        json!({
            "eventType": event_type,
            "object": {
                "id": sub_id,
                "object": "subscription",
                "status": status,
                "product": { "id": "prod_x", "price": 1990 },
                "current_period_start_date": "2025-04-01T00:00:00Z",
                "current_period_end_date": "2025-05-01T00:00:00Z",
                "canceled_at": "2025-04-15T00:00:00Z",
                "metadata": { "app_name": crate::events::PLATFORM_APP_NAME }
            }
        })
    }

    pub async fn user(store: &InMemoryBillingStore, id: &str, tier: PlanTier) -> User {
        store
            .insert_user(NewUser {
                id: id.to_string(),
                email: format!("{}@example.com", id),
                name: id.to_string(),
                password_hash: None,
                email_verified: true,
                plan_type: tier,
            })
            .await
            .unwrap()
    }

    pub fn paid_order(id: &str, order_no: &str, user_id: &str, amount: i64) -> Order {
        let now = OffsetDateTime::now_utc();
        Order {
            id: id.to_string(),
            order_no: order_no.to_string(),
            user_id: Some(user_id.to_string()),
            user_email: Some(format!("{}@example.com", user_id)),
            status: OrderStatus::Paid,
            amount,
            currency: "USD".to_string(),
            product_id: None,
            plan_type: None,
            payment_session_id: None,
            transaction_id: None,
            payment_amount: Some(amount),
            payment_currency: Some("USD".to_string()),
            payment_email: None,
            payment_user_name: None,
            payment_user_id: None,
            paid_at: Some(time::macros::datetime!(2025-01-31 12:00 UTC)),
            payment_result: None,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subscription(id: &str, user_id: &str, status: SubscriptionStatus, tier: PlanTier) -> Subscription {
        let now = OffsetDateTime::now_utc();
        Subscription {
            id: id.to_string(),
            subscription_no: format!("SUB-{}", id),
            user_id: user_id.to_string(),
            user_email: None,
            status,
            payment_provider: "creem".to_string(),
            payment_user_id: None,
            product_id: None,
            description: None,
            amount: tier.list_price_cents(),
            currency: "USD".to_string(),
            interval: "month".to_string(),
            interval_count: 1,
            plan_type: tier,
            plan_name: tier.plan_name().to_string(),
            current_period_start: None,
            current_period_end: None,
            canceled_at: None,
            subscription_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn tier_of(store: &InMemoryBillingStore, user_id: &str) -> PlanTier {
        store.find_user(user_id).await.unwrap().unwrap().plan_type
    }
}

#[cfg(test)]
mod checkout_tests {
    use serde_json::json;

    use soloboard_shared::{OrderStatus, PlanTier};

    use super::support::*;
    use crate::error::BillingError;
    use crate::memory::InMemoryBillingStore;
    use crate::orders::OrderService;
    use crate::store::BillingStore;

    // =========================================================================
    // BILL-C01: amount 1990, no existing sub_x -> subscription base, user base
    // =========================================================================
    #[tokio::test]
    async fn test_base_checkout_upgrades_user() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);

        deliver(&handler, &checkout_completed("sub_x", 1990, json!({"userId": "u1"}), "u1@example.com"))
            .await
            .unwrap();

        let subs = store.all_subscriptions().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "sub_x");
        assert_eq!(subs[0].plan_type, PlanTier::Base);
        assert_eq!(subs[0].user_id, "u1");
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }

    // =========================================================================
    // BILL-C02: same delivery twice -> duplicate key -> identical final state
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);
        let payload = checkout_completed("sub_x", 3990, json!({"userId": "u1"}), "u1@example.com");

        deliver(&handler, &payload).await.unwrap();
        let subs_after_first = store.all_subscriptions().await;
        let tier_after_first = tier_of(&store, "u1").await;

        deliver(&handler, &payload).await.unwrap();
        let subs_after_second = store.all_subscriptions().await;

        assert_eq!(subs_after_second.len(), 1);
        assert_eq!(subs_after_second[0].status, subs_after_first[0].status);
        assert_eq!(subs_after_second[0].plan_type, subs_after_first[0].plan_type);
        assert_eq!(
            subs_after_second[0].current_period_end,
            subs_after_first[0].current_period_end
        );
        assert_eq!(tier_of(&store, "u1").await, tier_after_first);
        assert_eq!(tier_after_first, PlanTier::Pro);

        // both deliveries audited as successful
        let audit = store.all_webhooks().await;
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(|w| w.processing_result == "success"));
    }

    // =========================================================================
    // BILL-C03: redelivery after a manual downgrade converges back
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_rewrites_tier_on_fallback_path() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);
        let payload = checkout_completed("sub_x", 1990, json!({"userId": "u1"}), "u1@example.com");

        deliver(&handler, &payload).await.unwrap();
        store.set_user_plan("u1", PlanTier::Free).await.unwrap();
        deliver(&handler, &payload).await.unwrap();

        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }

    // =========================================================================
    // BILL-C04: no userId, unknown email -> new free user created then upgraded
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_payer_gets_account_and_upgrade() {
        let store = InMemoryBillingStore::new();
        let handler = handler(&store);

        deliver(
            &handler,
            &checkout_completed("sub_new", 1990, json!({"app_name": crate::events::PLATFORM_APP_NAME}), "newbie@example.com"),
        )
        .await
        .unwrap();

        let users = store.all_users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "newbie@example.com");
        assert_eq!(users[0].name, "newbie");
        assert_eq!(users[0].plan_type, PlanTier::Base);

        let subs = store.all_subscriptions().await;
        assert_eq!(subs[0].user_id, users[0].id);
    }

    // =========================================================================
    // BILL-C05: order resolved by orderId is marked paid and linked
    // =========================================================================
    #[tokio::test]
    async fn test_order_marked_paid_and_linked() {
        let store = InMemoryBillingStore::new();
        let u = user(&store, "u1", PlanTier::Free).await;
        let order = OrderService::new(&store)
            .create_for_plan(&u.id, &u.email, PlanTier::Base, None)
            .await
            .unwrap();
        let handler = handler(&store);

        deliver(
            &handler,
            &checkout_completed(
                "sub_o",
                1990,
                json!({"userId": "u1", "orderId": order.id, "order_no": order.order_no}),
                "u1@example.com",
            ),
        )
        .await
        .unwrap();

        let stored = store.find_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.subscription_id.as_deref(), Some("sub_o"));
        assert_eq!(stored.transaction_id.as_deref(), Some("txn_sub_o"));
    }

    // =========================================================================
    // BILL-C06: order found by checkout id when metadata lacks order refs
    // =========================================================================
    #[tokio::test]
    async fn test_order_found_by_checkout_id() {
        let store = InMemoryBillingStore::new();
        let u = user(&store, "u1", PlanTier::Free).await;
        let order = OrderService::new(&store)
            .create_for_plan(&u.id, &u.email, PlanTier::Pro, None)
            .await
            .unwrap();
        store.set_order_checkout(&order.id, "ch_sub_c").await.unwrap();
        let handler = handler(&store);

        deliver(&handler, &checkout_completed("sub_c", 3990, json!({"userId": "u1"}), "u1@example.com"))
            .await
            .unwrap();

        let stored = store.find_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_unresolvable_identity_fails_delivery() {
        let store = InMemoryBillingStore::new();
        let handler = handler(&store);
        let mut payload = checkout_completed("sub_z", 1990, json!({"orderId": "nope"}), "");
        payload["object"]["customer"] = json!({ "id": "cust_1" });

        let err = deliver(&handler, &payload).await.unwrap_err();
        assert!(matches!(err, BillingError::IdentityUnresolved(_)));
        assert!(store.all_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_tier_derivation_is_pure_function_of_amount() {
        for (amount, expected) in [(1, PlanTier::Base), (2000, PlanTier::Base), (2001, PlanTier::Pro)] {
            let store = InMemoryBillingStore::new();
            user(&store, "u1", PlanTier::Free).await;
            let handler = handler(&store);
            deliver(&handler, &checkout_completed("sub_t", amount, json!({"userId": "u1"}), "u1@example.com"))
                .await
                .unwrap();
            assert_eq!(tier_of(&store, "u1").await, expected, "amount {}", amount);
        }
    }
}

#[cfg(test)]
mod cancellation_tests {
    use serde_json::json;

    use soloboard_shared::{PlanTier, SubscriptionStatus};

    use super::support::*;
    use crate::memory::InMemoryBillingStore;
    use crate::store::BillingStore;

    // =========================================================================
    // BILL-X01: cancel sets canceled + canceled_at and downgrades
    // =========================================================================
    #[tokio::test]
    async fn test_cancel_downgrades_owner() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);
        deliver(&handler, &checkout_completed("sub_a", 1990, json!({"userId": "u1"}), "u1@example.com"))
            .await
            .unwrap();

        deliver(&handler, &subscription_event("subscription.canceled", "sub_a", "canceled"))
            .await
            .unwrap();

        let sub = store.find_subscription("sub_a").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(
            sub.canceled_at,
            Some(time::macros::datetime!(2025-04-15 00:00 UTC))
        );
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Free);
    }

    // =========================================================================
    // BILL-X02: cancel downgrades even with another active subscription
    // =========================================================================
    #[tokio::test]
    async fn test_cancel_ignores_other_active_subscriptions() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Pro).await;
        store
            .seed_subscription(subscription("sub_keep", "u1", SubscriptionStatus::Active, PlanTier::Pro))
            .await;
        store
            .seed_subscription(subscription("sub_drop", "u1", SubscriptionStatus::Active, PlanTier::Base))
            .await;
        let handler = handler(&store);

        deliver(&handler, &subscription_event("subscription.canceled", "sub_drop", "canceled"))
            .await
            .unwrap();

        assert_eq!(tier_of(&store, "u1").await, PlanTier::Free);
        let keep = store.find_subscription("sub_keep").await.unwrap().unwrap();
        assert_eq!(keep.status, SubscriptionStatus::Active);
    }

    // =========================================================================
    // BILL-X03: cancel for unknown subscription is a logged no-op
    // =========================================================================
    #[tokio::test]
    async fn test_cancel_unknown_subscription() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Base).await;
        let handler = handler(&store);

        deliver(&handler, &subscription_event("subscription.canceled", "sub_ghost", "canceled"))
            .await
            .unwrap();

        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }
}

#[cfg(test)]
mod update_tests {
    use serde_json::json;

    use soloboard_shared::{PlanTier, SubscriptionStatus};

    use super::support::*;
    use crate::memory::InMemoryBillingStore;
    use crate::store::BillingStore;

    // =========================================================================
    // BILL-U01: renewal moves the period forward without touching the tier
    // =========================================================================
    #[tokio::test]
    async fn test_renewal_updates_period() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);
        deliver(&handler, &checkout_completed("sub_r", 1990, json!({"userId": "u1"}), "u1@example.com"))
            .await
            .unwrap();

        deliver(&handler, &subscription_event("subscription.paid", "sub_r", "active"))
            .await
            .unwrap();

        let sub = store.find_subscription("sub_r").await.unwrap().unwrap();
        assert_eq!(
            sub.current_period_end,
            Some(time::macros::datetime!(2025-05-01 00:00 UTC))
        );
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }

    // =========================================================================
    // BILL-U02: scheduled cancel maps to pending_cancel, still entitled
    // =========================================================================
    #[tokio::test]
    async fn test_scheduled_cancel_keeps_entitlement() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let handler = handler(&store);
        deliver(&handler, &checkout_completed("sub_p", 1990, json!({"userId": "u1"}), "u1@example.com"))
            .await
            .unwrap();

        deliver(&handler, &subscription_event("subscription.update", "sub_p", "scheduled_cancel"))
            .await
            .unwrap();

        let sub = store.find_subscription("sub_p").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PendingCancel);
        assert!(sub.status.is_entitled());
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }
}

#[cfg(test)]
mod repair_tests {
    use soloboard_shared::{OrderStatus, PlanTier, SubscriptionStatus};

    use super::support::*;
    use crate::error::BillingError;
    use crate::memory::InMemoryBillingStore;
    use crate::repair::{RepairMode, RepairOutcome, RepairService};
    use crate::store::BillingStore;

    // =========================================================================
    // BILL-R01: paid order without subscription gets one, user upgraded
    // =========================================================================
    #[tokio::test]
    async fn test_fix_creates_subscription() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        store.seed_order(paid_order("o1", "ORD-1", "u1", 3990)).await;

        let outcome = RepairService::new(&store)
            .repair_order("ORD-1", RepairMode::Fix)
            .await
            .unwrap();

        let RepairOutcome::Repaired(repaired) = outcome else {
            panic!("expected repair");
        };
        assert_eq!(repaired.tier, PlanTier::Pro);
        assert!(repaired.created);
        assert!(repaired.subscription_id.starts_with("creem_sub_"));
        // Jan 31 + 1 month clamps to Feb 28
        assert_eq!(
            repaired.current_period_end,
            time::macros::datetime!(2025-02-28 12:00 UTC)
        );
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Pro);

        let order = store.find_order("o1").await.unwrap().unwrap();
        assert_eq!(order.subscription_id.as_deref(), Some(repaired.subscription_id.as_str()));
    }

    // =========================================================================
    // BILL-R02: zero amount is treated as the base list price
    // =========================================================================
    #[tokio::test]
    async fn test_zero_amount_repairs_to_base() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let mut order = paid_order("o1", "ORD-1", "u1", 0);
        order.subscription_id = Some("sub_known".into());
        store.seed_order(order).await;

        let RepairOutcome::Repaired(repaired) = RepairService::new(&store)
            .repair_order("ORD-1", RepairMode::Trigger)
            .await
            .unwrap()
        else {
            panic!("expected repair");
        };
        assert_eq!(repaired.amount, 1990);
        assert_eq!(repaired.tier, PlanTier::Base);
        assert_eq!(repaired.subscription_id, "sub_known");
    }

    // =========================================================================
    // BILL-R03: fix skips when any subscription exists, trigger only when active
    // =========================================================================
    #[tokio::test]
    async fn test_modes_differ_on_canceled_subscription() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        store.seed_order(paid_order("o1", "ORD-1", "u1", 1990)).await;
        store
            .seed_subscription(subscription("sub_old", "u1", SubscriptionStatus::Canceled, PlanTier::Base))
            .await;
        let repair = RepairService::new(&store);

        assert!(matches!(
            repair.repair_order("ORD-1", RepairMode::Fix).await.unwrap(),
            RepairOutcome::Skipped { .. }
        ));
        assert!(matches!(
            repair.repair_order("ORD-1", RepairMode::Trigger).await.unwrap(),
            RepairOutcome::Repaired(_)
        ));
        assert_eq!(tier_of(&store, "u1").await, PlanTier::Base);
    }

    // =========================================================================
    // BILL-R04: missing order is NotFound, unpaid order is InvalidInput
    // =========================================================================
    #[tokio::test]
    async fn test_repair_preconditions() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let mut unpaid = paid_order("o2", "ORD-2", "u1", 1990);
        unpaid.status = OrderStatus::Created;
        store.seed_order(unpaid).await;
        let mut orphan = paid_order("o3", "ORD-3", "u1", 1990);
        orphan.user_id = None;
        store.seed_order(orphan).await;
        let repair = RepairService::new(&store);

        assert!(matches!(
            repair.repair_order("ORD-404", RepairMode::Fix).await,
            Err(BillingError::NotFound(_))
        ));
        assert!(matches!(
            repair.repair_order("ORD-2", RepairMode::Fix).await,
            Err(BillingError::InvalidInput(_))
        ));
        assert!(matches!(
            repair.repair_order("ORD-3", RepairMode::Fix).await,
            Err(BillingError::InvalidInput(_))
        ));
        assert!(matches!(
            repair.repair_order("  ", RepairMode::Fix).await,
            Err(BillingError::InvalidInput(_))
        ));
    }

    // =========================================================================
    // BILL-R05: repairing twice with a known subscription id converges
    // =========================================================================
    #[tokio::test]
    async fn test_trigger_twice_falls_back_to_update() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        let mut order = paid_order("o1", "ORD-1", "u1", 1990);
        order.subscription_id = Some("sub_fixed".into());
        store.seed_order(order).await;
        let repair = RepairService::new(&store);

        repair.repair_order("ORD-1", RepairMode::Trigger).await.unwrap();
        // force the second run past the active check
        store
            .update_subscription_state(
                "sub_fixed",
                crate::store::SubscriptionState {
                    status: SubscriptionStatus::Expired,
                    current_period_start: None,
                    current_period_end: None,
                },
            )
            .await
            .unwrap();
        let RepairOutcome::Repaired(second) = repair
            .repair_order("ORD-1", RepairMode::Trigger)
            .await
            .unwrap()
        else {
            panic!("expected repair");
        };
        assert!(!second.created);
        assert_eq!(store.all_subscriptions().await.len(), 1);
        let sub = store.find_subscription("sub_fixed").await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }
}

#[cfg(test)]
mod diagnostics_tests {
    use soloboard_shared::{PlanTier, SubscriptionStatus};

    use super::support::*;
    use crate::invariants::{DiagnosticQuery, InvariantChecker, PaymentIssueKind, ViolationSeverity};
    use crate::memory::InMemoryBillingStore;

    fn kinds(report: &crate::invariants::PaymentDiagnosticReport) -> Vec<PaymentIssueKind> {
        report.issues.iter().map(|i| i.kind).collect()
    }

    // =========================================================================
    // BILL-D01: healthy system reports no issues
    // =========================================================================
    #[tokio::test]
    async fn test_healthy_report() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Base).await;
        store.seed_order(paid_order("o1", "ORD-1", "u1", 1990)).await;
        store
            .seed_subscription(subscription("sub_1", "u1", SubscriptionStatus::Active, PlanTier::Base))
            .await;

        let report = InvariantChecker::new(&store)
            .run(&DiagnosticQuery::default())
            .await
            .unwrap();
        assert!(report.healthy, "issues: {:?}", report.issues);
        assert_eq!(report.summary.paid_orders, 1);
        assert_eq!(report.summary.active_subscriptions, 1);
        assert!(report.orders[0].has_subscription);
        assert!(report.recommendations.is_empty());
    }

    // =========================================================================
    // BILL-D02: paid order, free user, no subscription -> two HIGH issues
    // =========================================================================
    #[tokio::test]
    async fn test_missing_subscription_and_plan() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Free).await;
        store.seed_order(paid_order("o1", "ORD-1", "u1", 1990)).await;

        let report = InvariantChecker::new(&store)
            .run(&DiagnosticQuery::default())
            .await
            .unwrap();
        assert!(!report.healthy);
        let found = kinds(&report);
        assert!(found.contains(&PaymentIssueKind::MissingSubscription));
        assert!(found.contains(&PaymentIssueKind::UserPlanNotUpgraded));
        assert!(report.issues.iter().all(|i| i.severity == ViolationSeverity::High));
        assert_eq!(report.recommendations.len(), report.issues.len());
        assert!(report.recommendations[0].action.contains("ORD-1"));
    }

    // =========================================================================
    // BILL-D03: two active subscriptions and a tier mismatch are CRITICAL
    // =========================================================================
    #[tokio::test]
    async fn test_multiple_active_and_mismatch() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Base).await;
        store
            .seed_subscription(subscription("sub_1", "u1", SubscriptionStatus::Active, PlanTier::Base))
            .await;
        store
            .seed_subscription(subscription("sub_2", "u1", SubscriptionStatus::Active, PlanTier::Pro))
            .await;

        let report = InvariantChecker::new(&store)
            .run(&DiagnosticQuery::default())
            .await
            .unwrap();
        let found = kinds(&report);
        assert!(found.contains(&PaymentIssueKind::MultipleActiveSubscriptions));
        // newest active is sub_2 (pro), user is base
        assert!(found.contains(&PaymentIssueKind::TierMismatch));
        assert!(report
            .issues
            .iter()
            .all(|i| i.severity == ViolationSeverity::Critical));
    }

    // =========================================================================
    // BILL-D04: drill-down by order number and user id
    // =========================================================================
    #[tokio::test]
    async fn test_drill_down() {
        let store = InMemoryBillingStore::new();
        user(&store, "u1", PlanTier::Base).await;
        store.seed_order(paid_order("o1", "ORD-1", "u1", 1990)).await;
        store
            .seed_subscription(subscription("sub_1", "u1", SubscriptionStatus::Active, PlanTier::Base))
            .await;

        let report = InvariantChecker::new(&store)
            .run(&DiagnosticQuery {
                order_no: Some("ORD-1".into()),
                user_id: Some("u1".into()),
            })
            .await
            .unwrap();
        assert_eq!(report.specific_order.unwrap().id, "o1");
        let specific = report.specific_user.unwrap();
        assert_eq!(specific.user.id, "u1");
        assert_eq!(specific.subscriptions.len(), 1);
    }
}
