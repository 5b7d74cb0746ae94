//! Monitor error types

use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The owner's plan does not allow another site.
    #[error("Your {plan} plan allows {limit} site(s). Upgrade to add more.")]
    SiteLimitReached {
        plan: &'static str,
        current_count: u32,
        limit: u32,
    },

    #[error("Email delivery not configured")]
    EmailNotConfigured,

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for MonitorError {
    fn from(e: sqlx::Error) -> Self {
        MonitorError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        MonitorError::Http(e.to_string())
    }
}
