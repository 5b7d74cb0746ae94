//! Plan checkout

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use soloboard_billing::CheckoutResponse;
use soloboard_shared::PlanTier;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// `base` or `pro`; loose names such as "Pro Plan" are accepted.
    pub plan: String,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let tier = PlanTier::from_plan_name(&req.plan);
    if !tier.is_paid() {
        return Err(ApiError::BadRequest(format!("Unknown plan: {}", req.plan)));
    }

    let user = state
        .billing_store()
        .find_user(&auth_user.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let checkout = state.billing.checkout.create_checkout(&user, tier).await?;
    Ok(Json(checkout))
}
