// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! SoloBoard API Library
//!
//! HTTP surface for SoloBoard: accounts, monitored sites and dashboard,
//! plan checkout, Creem webhooks, cron triggers and payment admin tooling.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, Integrations};
