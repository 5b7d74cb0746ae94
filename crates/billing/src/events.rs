//! Normalized payment events
//!
//! Creem delivers either checkout-shaped objects (`checkout.completed`) or
//! subscription-shaped objects (`subscription.*`). Both are flattened into a
//! [`PaymentEvent`] carrying a [`PaymentSession`] so the handlers never touch
//! provider JSON directly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use soloboard_shared::SubscriptionStatus;

use crate::error::{BillingError, BillingResult};

/// `app_name` our own checkouts stamp into metadata.
pub const PLATFORM_APP_NAME: &str = "Command Center";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentEventType {
    CheckoutSuccess,
    PaymentSuccess,
    SubscriptionUpdated,
    SubscriptionCanceled,
    Unknown(String),
}

impl PaymentEventType {
    /// Map a provider event name. Normalized names are accepted as-is.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "checkout.completed" | "checkout.success" => PaymentEventType::CheckoutSuccess,
            "subscription.paid" | "payment.success" => PaymentEventType::PaymentSuccess,
            "subscription.active"
            | "subscription.update"
            | "subscription.trialing"
            | "subscription.expired"
            | "subscription.updated" => PaymentEventType::SubscriptionUpdated,
            "subscription.canceled" => PaymentEventType::SubscriptionCanceled,
            other => PaymentEventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentEventType::CheckoutSuccess => "checkout.success",
            PaymentEventType::PaymentSuccess => "payment.success",
            PaymentEventType::SubscriptionUpdated => "subscription.updated",
            PaymentEventType::SubscriptionCanceled => "subscription.canceled",
            PaymentEventType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form checkout metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub BTreeMap<String, Value>);

impl Metadata {
    /// First non-empty value among `keys`. Numbers are stringified.
    pub fn get_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn user_id(&self) -> Option<String> {
        self.get_str(&["userId", "user_id"])
    }

    pub fn order_id(&self) -> Option<String> {
        self.get_str(&["orderId", "order_id"])
    }

    pub fn order_no(&self) -> Option<String> {
        self.get_str(&["order_no", "orderNo"])
    }

    pub fn user_email(&self) -> Option<String> {
        self.get_str(&["userEmail", "user_email"])
    }

    pub fn site_id(&self) -> Option<String> {
        self.get_str(&["site_id", "siteId"])
    }

    /// Deliveries for our own product carry an order/user reference or our
    /// app name. Anything else comes from a customer's own Creem store.
    pub fn is_platform_payment(&self) -> bool {
        self.get_str(&["app_name"]).as_deref() == Some(PLATFORM_APP_NAME)
            || self.user_id().is_some()
            || self.order_id().is_some()
            || self.order_no().is_some()
    }
}

/// What was paid and by whom. Amounts are cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentInfo {
    pub amount: i64,
    pub currency: String,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_email: Option<String>,
    pub payment_user_name: Option<String>,
    /// Provider customer id
    pub payment_user_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub status: SubscriptionStatus,
    pub amount: i64,
    pub currency: String,
    pub interval: String,
    pub interval_count: i32,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub canceled_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentSession {
    pub payment_info: Option<PaymentInfo>,
    pub subscription_info: Option<SubscriptionInfo>,
    pub subscription_id: Option<String>,
    pub checkout_id: Option<String>,
    pub metadata: Metadata,
    /// Provider object as delivered
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentEvent {
    pub event_id: Option<String>,
    #[serde(serialize_with = "serialize_event_type")]
    pub event_type: PaymentEventType,
    pub session: PaymentSession,
}

fn serialize_event_type<S: serde::Serializer>(
    t: &PaymentEventType,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(t.as_str())
}

impl PaymentEvent {
    /// Parse a verified webhook body.
    pub fn from_creem_payload(payload: &[u8]) -> BillingResult<Self> {
        let envelope: RawEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        let event_type = PaymentEventType::from_provider(&envelope.event_type);
        let raw_object = envelope.object.clone();
        let object: RawObject = if envelope.object.is_null() {
            RawObject::default()
        } else {
            serde_json::from_value(envelope.object)
                .map_err(|e| BillingError::InvalidPayload(format!("object: {}", e)))?
        };

        let session = if object.object.as_deref() == Some("subscription") {
            subscription_session(object, raw_object)
        } else {
            checkout_session(object, raw_object)
        };

        Ok(Self {
            event_id: envelope.id,
            event_type,
            session,
        })
    }
}

// ============================================================================
// Raw Creem shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "eventType", alias = "event_type", alias = "type")]
    event_type: String,
    #[serde(default)]
    object: Value,
}

/// Nested objects arrive either expanded or as a bare id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expandable<T> {
    Object(T),
    Id(String),
}

impl<T> Expandable<T> {
    fn into_object(self) -> Option<T> {
        match self {
            Expandable::Object(o) => Some(o),
            Expandable::Id(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawObject {
    id: Option<String>,
    object: Option<String>,
    status: Option<String>,
    customer: Option<Expandable<RawCustomer>>,
    order: Option<RawOrder>,
    subscription: Option<Expandable<RawSubscription>>,
    product: Option<Expandable<RawProduct>>,
    metadata: Option<Metadata>,
    current_period_start_date: Option<String>,
    current_period_end_date: Option<String>,
    canceled_at: Option<String>,
    last_transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCustomer {
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOrder {
    transaction: Option<String>,
    amount: Option<f64>,
    currency: Option<String>,
    amount_paid: Option<f64>,
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSubscription {
    id: Option<String>,
    status: Option<String>,
    current_period_start_date: Option<String>,
    current_period_end_date: Option<String>,
    canceled_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProduct {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    billing_period: Option<String>,
}

fn cents(v: Option<f64>) -> Option<i64> {
    v.map(|a| a.round() as i64)
}

fn parse_time(raw: Option<&str>) -> Option<OffsetDateTime> {
    let raw = raw?;
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "Ignoring unparseable timestamp in webhook");
            None
        }
    }
}

/// `every-month` -> (`month`, 1), `every-three-months` -> (`month`, 3), ...
pub fn billing_period_interval(period: Option<&str>) -> (String, i32) {
    match period.unwrap_or("every-month") {
        "every-year" => ("year".to_string(), 1),
        "every-three-months" => ("month".to_string(), 3),
        "every-six-months" => ("month".to_string(), 6),
        "once" => ("once".to_string(), 1),
        _ => ("month".to_string(), 1),
    }
}

fn customer_fields(customer: Option<Expandable<RawCustomer>>) -> RawCustomer {
    match customer {
        Some(Expandable::Object(c)) => c,
        Some(Expandable::Id(id)) => RawCustomer {
            id: Some(id),
            ..Default::default()
        },
        None => RawCustomer::default(),
    }
}

fn checkout_session(object: RawObject, raw: Value) -> PaymentSession {
    let customer = customer_fields(object.customer);
    let product = object
        .product
        .and_then(Expandable::into_object)
        .unwrap_or_default();
    let order = object.order;

    let payment_info = order.as_ref().map(|o| {
        let currency = o
            .currency
            .clone()
            .or_else(|| product.currency.clone())
            .unwrap_or_else(|| "USD".to_string());
        PaymentInfo {
            amount: cents(o.amount).or(cents(product.price)).unwrap_or(0),
            currency: currency.clone(),
            payment_amount: cents(o.amount_paid),
            payment_currency: Some(currency),
            payment_email: customer.email.clone(),
            payment_user_name: customer.name.clone(),
            payment_user_id: customer.id.clone(),
            transaction_id: o.transaction.clone(),
            paid_at: parse_time(o.created_at.as_deref()),
        }
    });

    let (subscription_id, subscription_info) = match object.subscription {
        Some(Expandable::Object(sub)) => {
            let (interval, interval_count) =
                billing_period_interval(product.billing_period.as_deref());
            let amount = cents(product.price)
                .or_else(|| order.as_ref().and_then(|o| cents(o.amount)))
                .unwrap_or(0);
            let info = SubscriptionInfo {
                status: SubscriptionStatus::from_provider(sub.status.as_deref().unwrap_or("active")),
                amount,
                currency: product.currency.clone().unwrap_or_else(|| "USD".to_string()),
                interval,
                interval_count,
                current_period_start: parse_time(sub.current_period_start_date.as_deref()),
                current_period_end: parse_time(sub.current_period_end_date.as_deref()),
                product_id: product.id.clone(),
                description: product.description.clone().or(product.name.clone()),
                canceled_at: parse_time(sub.canceled_at.as_deref()),
            };
            (sub.id, Some(info))
        }
        Some(Expandable::Id(id)) => (Some(id), None),
        None => (None, None),
    };

    PaymentSession {
        payment_info,
        subscription_info,
        subscription_id,
        checkout_id: object.id,
        metadata: object.metadata.unwrap_or_default(),
        raw,
    }
}

fn subscription_session(object: RawObject, raw: Value) -> PaymentSession {
    let customer = customer_fields(object.customer);
    let product = object
        .product
        .and_then(Expandable::into_object)
        .unwrap_or_default();
    let amount = cents(product.price).unwrap_or(0);
    let currency = product.currency.clone().unwrap_or_else(|| "USD".to_string());
    let (interval, interval_count) = billing_period_interval(product.billing_period.as_deref());

    let subscription_info = SubscriptionInfo {
        status: SubscriptionStatus::from_provider(object.status.as_deref().unwrap_or("active")),
        amount,
        currency: currency.clone(),
        interval,
        interval_count,
        current_period_start: parse_time(object.current_period_start_date.as_deref()),
        current_period_end: parse_time(object.current_period_end_date.as_deref()),
        product_id: product.id.clone(),
        description: product.description.clone().or(product.name.clone()),
        canceled_at: parse_time(object.canceled_at.as_deref()),
    };

    let payment_info = PaymentInfo {
        amount,
        currency: currency.clone(),
        payment_amount: Some(amount),
        payment_currency: Some(currency),
        payment_email: customer.email,
        payment_user_name: customer.name,
        payment_user_id: customer.id,
        transaction_id: object.last_transaction_id,
        paid_at: None,
    };

    PaymentSession {
        payment_info: Some(payment_info),
        subscription_info: Some(subscription_info),
        subscription_id: object.id,
        checkout_id: None,
        metadata: object.metadata.unwrap_or_default(),
        raw,
    }
}
