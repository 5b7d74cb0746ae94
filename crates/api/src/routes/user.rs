//! Current user

use axum::{extract::State, Extension, Json};
use serde::Serialize;

use soloboard_shared::{PlanTier, Subscription, User};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    pub plan: PlanTier,
    /// Newest subscription that still grants its tier.
    pub subscription: Option<Subscription>,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MeResponse>> {
    let user = state
        .billing_store()
        .find_user(&auth_user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let subscription = state.billing.subscriptions().active_for_user(&user.id).await?;

    Ok(Json(MeResponse {
        plan: user.plan_type,
        user,
        subscription,
    }))
}
