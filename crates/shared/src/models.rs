//! Persisted row types.
//!
//! Ids are text (uuid v4 for rows we create, provider ids for subscriptions).
//! Money is stored as integer cents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::plan::{PlanTier, UnknownVariant};
use crate::sql_text::text_enum_sqlx;

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// Generate a fresh text id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant::new($kind, other)),
                }
            }
        }

        text_enum_sqlx!($name);
    };
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub plan_type: PlanTier,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub plan_type: PlanTier,
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
}

string_enum!(OrderStatus, "order status", {
    Created => "created",
    Paid => "paid",
    Failed => "failed",
});

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Order {
    pub id: String,
    pub order_no: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub status: OrderStatus,
    pub amount: i64,
    pub currency: String,
    pub product_id: Option<String>,
    pub plan_type: Option<PlanTier>,
    /// Provider checkout id
    pub payment_session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub payment_email: Option<String>,
    pub payment_user_name: Option<String>,
    pub payment_user_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    pub payment_result: Option<serde_json::Value>,
    pub subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: String,
    pub order_no: String,
    pub user_id: String,
    pub user_email: String,
    pub amount: i64,
    pub currency: String,
    pub product_id: Option<String>,
    pub plan_type: PlanTier,
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Trialing,
    PendingCancel,
    Expired,
}

string_enum!(SubscriptionStatus, "subscription status", {
    Active => "active",
    Canceled => "canceled",
    Trialing => "trialing",
    PendingCancel => "pending_cancel",
    Expired => "expired",
});

impl SubscriptionStatus {
    /// Map a status string reported by the payment provider.
    ///
    /// Unrecognized values fall back to `Active`.
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "active" | "paid" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            "scheduled_cancel" | "pending_cancel" => SubscriptionStatus::PendingCancel,
            "expired" | "unpaid" | "past_due" => SubscriptionStatus::Expired,
            other => {
                tracing::warn!(status = %other, "Unrecognized provider subscription status, treating as active");
                SubscriptionStatus::Active
            }
        }
    }

    /// Whether the subscription still grants its tier.
    pub fn is_entitled(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::Trialing
                | SubscriptionStatus::PendingCancel
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Subscription {
    /// Provider subscription id
    pub id: String,
    pub subscription_no: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub status: SubscriptionStatus,
    pub payment_provider: String,
    pub payment_user_id: Option<String>,
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub interval: String,
    pub interval_count: i32,
    pub plan_type: PlanTier,
    pub plan_name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    pub subscription_result: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: String,
    pub subscription_no: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub status: SubscriptionStatus,
    pub payment_provider: String,
    pub payment_user_id: Option<String>,
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub interval: String,
    pub interval_count: i32,
    pub plan_type: PlanTier,
    pub plan_name: String,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub subscription_result: Option<serde_json::Value>,
}

// ============================================================================
// Monitored sites
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
}

string_enum!(SyncStatus, "sync status", {
    Success => "success",
    Error => "error",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeStatus {
    Up,
    Down,
}

/// Metrics cached on the site row after each sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSnapshot {
    pub revenue_today: i64,
    pub visitors_today: i64,
    pub uptime: UptimeStatus,
    pub response_time_ms: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub synced_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredSite {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub platform: String,
    pub api_config: serde_json::Value,
    pub status: String,
    pub last_sync_status: Option<SyncStatus>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    pub last_sync_error: Option<String>,
    pub last_snapshot: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MonitoredSite {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Decoded snapshot, if one was stored and still parses.
    pub fn snapshot(&self) -> Option<SiteSnapshot> {
        self.last_snapshot
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone)]
pub struct NewSite {
    pub user_id: String,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub logo_url: Option<String>,
    pub platform: String,
    pub api_config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SiteMetricsDaily {
    pub site_id: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub revenue: i64,
    pub visitors: i64,
    pub uptime_percentage: f64,
    pub response_time: i32,
}

// ============================================================================
// Webhook audit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PaymentWebhookEvent {
    pub id: Uuid,
    pub provider_event_id: Option<String>,
    pub event_type: String,
    pub processing_result: String,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            SubscriptionStatus::from_provider("scheduled_cancel"),
            SubscriptionStatus::PendingCancel
        );
        assert_eq!(
            SubscriptionStatus::from_provider("paid"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::Expired
        );
        assert_eq!(
            SubscriptionStatus::from_provider("Canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_provider("something_new"),
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn entitlement_statuses() {
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(SubscriptionStatus::PendingCancel.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
        assert!(!SubscriptionStatus::Expired.is_entitled());
    }

    #[test]
    fn status_text_round_trips_through_from_str() {
        assert_eq!(
            "pending_cancel".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::PendingCancel
        );
        assert_eq!(SubscriptionStatus::PendingCancel.as_str(), "pending_cancel");
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn metrics_date_serializes_as_iso() {
        let row = SiteMetricsDaily {
            site_id: "s1".into(),
            date: time::macros::date!(2025 - 03 - 07),
            revenue: 1990,
            visitors: 12,
            uptime_percentage: 100.0,
            response_time: 120,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["date"], "2025-03-07");
        assert_eq!(json["siteId"], "s1");
    }

    #[test]
    fn unparseable_snapshot_is_none() {
        let now = OffsetDateTime::now_utc();
        let site = MonitoredSite {
            id: "s".into(),
            user_id: "u".into(),
            name: "n".into(),
            domain: "d".into(),
            url: "https://d".into(),
            logo_url: None,
            platform: "UPTIME".into(),
            api_config: serde_json::json!({}),
            status: "active".into(),
            last_sync_status: None,
            last_sync_at: None,
            last_sync_error: None,
            last_snapshot: Some(serde_json::json!({"garbage": true})),
            created_at: now,
            updated_at: now,
        };
        assert!(site.snapshot().is_none());
    }
}
