//! API error type and its JSON response mapping
//!
//! Every handler error renders as `{"error": <kind>, "message": <detail>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use soloboard_billing::BillingError;
use soloboard_monitor::MonitorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Your {plan} plan allows {limit} site(s). Upgrade to add more.")]
    SiteLimitReached {
        plan: &'static str,
        current_count: u32,
        limit: u32,
    },

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::SiteLimitReached { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Bad request",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "Not found",
            ApiError::Conflict(_) => "Conflict",
            ApiError::SiteLimitReached { .. } => "Site limit reached",
            ApiError::ServiceUnavailable(_) => "Service unavailable",
            ApiError::Timeout(_) => "Timeout",
            ApiError::Database(_) | ApiError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = match &self {
            ApiError::SiteLimitReached {
                plan,
                current_count,
                limit,
            } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "currentPlan": plan,
                "currentCount": current_count,
                "limit": limit,
                "upgradeUrl": "/pricing",
            }),
            _ => json!({
                "error": self.kind(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::NotConfigured => {
                ApiError::ServiceUnavailable("Payment provider not configured".to_string())
            }
            BillingError::WebhookSignatureInvalid => {
                ApiError::Unauthorized("Invalid signature".to_string())
            }
            BillingError::InvalidPayload(msg) | BillingError::InvalidInput(msg) => {
                ApiError::BadRequest(msg)
            }
            BillingError::NotFound(msg) => ApiError::NotFound(msg),
            BillingError::DuplicateSubscription(id) => {
                ApiError::Conflict(format!("Subscription {} already exists", id))
            }
            BillingError::DuplicateUser(_) => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            e @ (BillingError::IdentityUnresolved(_)
            | BillingError::Provider(_)
            | BillingError::Internal(_)) => ApiError::Internal(e.to_string()),
            BillingError::Database(msg) => ApiError::Database(msg),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::SiteNotFound(id) => ApiError::NotFound(format!("Site not found: {}", id)),
            MonitorError::InvalidInput(msg) => ApiError::BadRequest(msg),
            MonitorError::SiteLimitReached {
                plan,
                current_count,
                limit,
            } => ApiError::SiteLimitReached {
                plan,
                current_count,
                limit,
            },
            MonitorError::EmailNotConfigured => {
                ApiError::ServiceUnavailable("Email delivery not configured".to_string())
            }
            MonitorError::Database(msg) => ApiError::Database(msg),
            e @ (MonitorError::Email(_) | MonitorError::Http(_) | MonitorError::Internal(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn site_limit_carries_upgrade_info() {
        let response = ApiError::from(MonitorError::SiteLimitReached {
            plan: "Free",
            current_count: 1,
            limit: 1,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Site limit reached");
        assert_eq!(body["currentPlan"], "Free");
        assert_eq!(body["currentCount"], 1);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["upgradeUrl"], "/pricing");
    }

    #[tokio::test]
    async fn database_errors_are_500_with_raw_message() {
        let response = ApiError::from(BillingError::Database("connection reset".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["message"], "Database error: connection reset");
    }

    #[test]
    fn billing_mapping() {
        assert_eq!(
            ApiError::from(BillingError::WebhookSignatureInvalid).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(BillingError::NotFound("Order ORD-1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(BillingError::InvalidInput("order not paid".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(BillingError::IdentityUnresolved("no email".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BillingError::NotConfigured).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(BillingError::DuplicateUser("a@example.com".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
