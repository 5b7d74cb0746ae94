//! Payment diagnostics and repair for operators

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use soloboard_billing::{DiagnosticQuery, PaymentDiagnosticReport, RepairMode, RepairOutcome};
use soloboard_shared::PaymentWebhookEvent;

use crate::{error::ApiResult, state::AppState};

const DEFAULT_WEBHOOK_PAGE: i64 = 50;
const MAX_WEBHOOK_PAGE: i64 = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub order_no: Option<String>,
    pub user_id: Option<String>,
}

pub async fn check_payment_status(
    State(state): State<AppState>,
    Query(query): Query<PaymentStatusQuery>,
) -> ApiResult<Json<PaymentDiagnosticReport>> {
    let report = state
        .billing
        .diagnostics(&DiagnosticQuery {
            order_no: query.order_no.filter(|s| !s.trim().is_empty()),
            user_id: query.user_id.filter(|s| !s.trim().is_empty()),
        })
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    #[serde(alias = "order_no")]
    pub order_no: String,
}

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: RepairOutcome,
}

async fn repair(state: &AppState, order_no: &str, mode: RepairMode) -> ApiResult<Json<RepairResponse>> {
    tracing::info!(order_no = %order_no, mode = ?mode, "Admin payment repair requested");
    let outcome = state.billing.repair_order(order_no, mode).await?;
    Ok(Json(RepairResponse {
        success: true,
        outcome,
    }))
}

pub async fn fix_payment(
    State(state): State<AppState>,
    Json(req): Json<RepairRequest>,
) -> ApiResult<Json<RepairResponse>> {
    repair(&state, &req.order_no, RepairMode::Fix).await
}

pub async fn trigger_webhook(
    State(state): State<AppState>,
    Json(req): Json<RepairRequest>,
) -> ApiResult<Json<RepairResponse>> {
    repair(&state, &req.order_no, RepairMode::Trigger).await
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WebhookList {
    pub webhooks: Vec<PaymentWebhookEvent>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<WebhookListQuery>,
) -> ApiResult<Json<WebhookList>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_WEBHOOK_PAGE)
        .clamp(1, MAX_WEBHOOK_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);
    let status = query.status.as_deref().filter(|s| !s.trim().is_empty());

    let webhooks = state
        .billing
        .webhooks
        .list_webhooks(status, limit, offset)
        .await?;
    Ok(Json(WebhookList {
        webhooks,
        limit,
        offset,
    }))
}
