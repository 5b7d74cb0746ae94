//! Monitored sites, owner dashboard and visitor tracking

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use soloboard_monitor::{
    AddSiteRequest, AddedSite, Dashboard, DashboardService, SiteListing, SiteService,
};
use soloboard_shared::PlanTier;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

/// Plan tier as stored on the user row.
async fn tier_of(state: &AppState, user_id: &str) -> ApiResult<PlanTier> {
    Ok(state.billing.entitlements().tier_for_user(user_id).await?)
}

pub async fn list_sites(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SiteListing>> {
    let tier = tier_of(&state, &auth_user.user_id).await?;
    let listing = SiteService::new(state.sites.as_ref())
        .list_for_user(&auth_user.user_id, tier)
        .await?;
    Ok(Json(listing))
}

pub async fn add_site(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<AddSiteRequest>,
) -> ApiResult<(StatusCode, Json<AddedSite>)> {
    let tier = tier_of(&state, &auth_user.user_id).await?;
    let added = SiteService::new(state.sites.as_ref())
        .add_site(&auth_user.user_id, tier, req)
        .await?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Dashboard>> {
    let dashboard = DashboardService::new(state.sites.as_ref())
        .for_user(&auth_user.user_id)
        .await?;
    Ok(Json(dashboard))
}

/// Public pixel endpoint: counts one visit for today.
pub async fn track_visit(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let visitors = SiteService::new(state.sites.as_ref())
        .record_visit(&site_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "visitorsToday": visitors,
    })))
}
