// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SoloBoard Billing Module
//!
//! Handles Creem integration for plan purchases and the webhook-driven
//! reconciliation that keeps orders, subscriptions and user tiers in step.
//!
//! ## Features
//!
//! - **Checkout**: Create an order and a hosted Creem checkout for a paid tier
//! - **Webhooks**: Verify `creem-signature`, classify and dispatch deliveries
//! - **Reconciliation**: Identity resolution, order payment, subscription upsert,
//!   tier propagation
//! - **Repair**: Admin tooling for paid orders that never produced a subscription
//! - **Invariants**: Read-only diagnostics over recent payments

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod identity;
pub mod invariants;
pub mod memory;
pub mod orders;
pub mod repair;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

use std::sync::Arc;

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Client
pub use client::{CreemClient, CreemConfig, CreemEnvironment, ProductIds};

// Entitlement
pub use entitlement::EntitlementService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    Metadata, PaymentEvent, PaymentEventType, PaymentInfo, PaymentSession, SubscriptionInfo,
    PLATFORM_APP_NAME,
};

// Identity
pub use identity::{IdentityResolver, ResolvedIdentity};

// Invariants
pub use invariants::{
    DiagnosticQuery, InvariantChecker, InvariantViolation, PaymentDiagnosticReport,
    PaymentIssueKind, ViolationSeverity,
};

// Stores
pub use memory::InMemoryBillingStore;
pub use store::{BillingStore, OrderPayment, PgBillingStore, SubscriptionState};

// Repair
pub use repair::{RepairMode, RepairOutcome, RepairService, RepairedOrder};

// Subscriptions
pub use subscriptions::{SubscriptionDraft, SubscriptionService, UpsertOutcome};

// Webhooks
pub use webhooks::{
    sign_payload, CheckoutReconciliation, StoreOrder, WebhookHandler, WebhookOutcome,
    SIGNATURE_HEADER,
};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub store: Arc<dyn BillingStore>,
    pub checkout: CheckoutService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a billing service. Checkout is disabled without an API key,
    /// webhook verification without a signing secret.
    pub fn new(
        store: Arc<dyn BillingStore>,
        config: CreemConfig,
        app_url: String,
    ) -> BillingResult<Self> {
        let signing_secret = config.signing_secret.clone();
        let creem = if config.checkout_enabled() {
            Some(CreemClient::new(config)?)
        } else {
            None
        };

        Ok(Self {
            checkout: CheckoutService::new(store.clone(), creem, app_url),
            webhooks: WebhookHandler::new(store.clone(), signing_secret),
            store,
        })
    }

    pub fn entitlements(&self) -> EntitlementService<'_> {
        EntitlementService::new(self.store.as_ref())
    }

    pub fn subscriptions(&self) -> SubscriptionService<'_> {
        SubscriptionService::new(self.store.as_ref())
    }

    pub async fn diagnostics(&self, query: &DiagnosticQuery) -> BillingResult<PaymentDiagnosticReport> {
        InvariantChecker::new(self.store.as_ref()).run(query).await
    }

    pub async fn repair_order(&self, order_no: &str, mode: RepairMode) -> BillingResult<RepairOutcome> {
        RepairService::new(self.store.as_ref())
            .repair_order(order_no, mode)
            .await
    }
}
