//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Payment provider not configured")]
    NotConfigured,

    #[error("Webhook signature invalid")]
    WebhookSignatureInvalid,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// The delivery carried neither a user id nor an email we could act on.
    #[error("Cannot determine user for payment: {0}")]
    IdentityUnresolved(String),

    #[error("Subscription {0} already exists")]
    DuplicateSubscription(String),

    /// Another writer created a user with this email first.
    #[error("User {0} already exists")]
    DuplicateUser(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Creem API error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::Provider(e.to_string())
    }
}
