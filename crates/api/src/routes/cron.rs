//! Scheduler-triggered endpoints

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use time::OffsetDateTime;

use soloboard_monitor::SyncRun;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const SYNC_TIMEOUT: Duration = Duration::from_secs(300);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(flatten)]
    pub run: SyncRun,
    pub duration_ms: u128,
}

pub async fn sync_sites(State(state): State<AppState>) -> ApiResult<Json<SyncResponse>> {
    let started = std::time::Instant::now();
    tracing::info!("Cron: site sync started");

    let run = tokio::time::timeout(SYNC_TIMEOUT, state.monitor.run())
        .await
        .map_err(|_| {
            tracing::error!(timeout_secs = SYNC_TIMEOUT.as_secs(), "Cron: site sync timed out");
            ApiError::Timeout("Site sync timed out".to_string())
        })??;

    Ok(Json(SyncResponse {
        success: true,
        run,
        duration_ms: started.elapsed().as_millis(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: "healthy",
            error: None,
        }
    }

    fn configured(enabled: bool) -> Self {
        Self {
            status: if enabled { "configured" } else { "not_configured" },
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub database: ComponentHealth,
    pub creem_checkout: ComponentHealth,
    pub creem_webhooks: ComponentHealth,
    pub alert_email: ComponentHealth,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

/// Database round trip plus which integrations are configured.
pub async fn system_health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, soloboard_shared::ping(&state.pool)).await {
        Ok(Ok(())) => ComponentHealth::healthy(),
        Ok(Err(e)) => ComponentHealth {
            status: "unhealthy",
            error: Some(e.to_string()),
        },
        Err(_) => ComponentHealth {
            status: "unhealthy",
            error: Some("Database check timed out".to_string()),
        },
    };

    let report = HealthReport {
        healthy: database.error.is_none(),
        database,
        creem_checkout: ComponentHealth::configured(state.billing.checkout.is_enabled()),
        creem_webhooks: ComponentHealth::configured(state.billing.webhooks.is_configured()),
        alert_email: ComponentHealth::configured(state.monitor.alerts_enabled()),
        checked_at: OffsetDateTime::now_utc(),
    };

    if report.healthy {
        tracing::info!("Cron: system health check passed");
        (StatusCode::OK, Json(report))
    } else {
        tracing::error!(error = ?report.database.error, "Cron: system health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, Json(report))
    }
}
