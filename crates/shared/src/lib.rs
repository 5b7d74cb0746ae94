#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SoloBoard shared types
//!
//! Database plumbing, persisted row types, and plan tiers used by the
//! billing, monitor, api and worker crates.

pub mod db;
pub mod models;
pub mod plan;

mod sql_text;

pub use db::{create_migration_pool, create_pool, ping, run_migrations};
pub use models::{
    MonitoredSite, NewOrder, NewSite, NewSubscription, NewUser, Order, OrderStatus,
    PaymentWebhookEvent, SiteMetricsDaily, SiteSnapshot, Subscription, SubscriptionStatus,
    SyncStatus, UptimeStatus, User,
};
pub use plan::{can_add_more_sites, PlanLimits, PlanTier, SiteAllowance, UnknownVariant};
