//! Email + password sign-up and sign-in

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use soloboard_shared::{models::new_id, NewUser, PlanTier, User};

use crate::{
    auth::{hash_password, session_cookie, validate_password_strength, verify_password},
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    pub expires_in: i64,
}

fn normalize_email(raw: &str) -> ApiResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::BadRequest("Invalid email address".to_string())),
    }
}

fn issue_session(state: &AppState, user: User) -> ApiResult<(HeaderMap, SessionResponse)> {
    let (token, _jti) = state
        .jwt_manager
        .generate_token(&user.id, &user.email)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let expires_in = state.jwt_manager.expiry_secs();

    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&session_cookie(&token, expires_in))
        .map_err(|e| ApiError::Internal(format!("Invalid session cookie: {}", e)))?;
    headers.insert(SET_COOKIE, cookie);

    Ok((
        headers,
        SessionResponse {
            user,
            token,
            expires_in,
        },
    ))
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email)?;
    validate_password_strength(&req.password).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let store = state.billing_store();
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("An account with this email already exists".to_string()));
    }

    let password_hash = hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let user = store
        .insert_user(NewUser {
            id: new_id(),
            email,
            name,
            password_hash: Some(password_hash),
            email_verified: false,
            plan_type: PlanTier::Free,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User signed up");

    let (headers, body) = issue_session(&state, user)?;
    Ok((StatusCode::CREATED, headers, Json(body)))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&req.email).map_err(|_| invalid())?;
    let user = state
        .billing_store()
        .find_user_by_email(&email)
        .await?
        .ok_or_else(invalid)?;

    // Users created from a payment webhook have no password until they reset it.
    let verified = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&req.password, hash));
    if !verified {
        tracing::info!(user_id = %user.id, "Sign-in rejected");
        return Err(invalid());
    }

    tracing::info!(user_id = %user.id, "User signed in");
    let (headers, body) = issue_session(&state, user)?;
    Ok((headers, Json(body)))
}
