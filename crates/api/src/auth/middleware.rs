//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::jwt::{JwtError, JwtManager};

/// HttpOnly cookie carrying the session token.
pub const SESSION_COOKIE: &str = "soloboard_session";

/// Authenticated user extracted from the session token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub session_id: String,
}

/// State needed for session authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

/// State needed for the admin guard
#[derive(Clone)]
pub struct AdminState {
    pub admin_secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Admin access disabled")]
    AdminDisabled,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::AdminDisabled => (StatusCode::FORBIDDEN, "Admin access disabled"),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

fn extract_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE).and_then(|h| h.to_str().ok())?;
    cookies.split(';').find_map(|cookie| {
        cookie
            .trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// `Authorization: Bearer` value, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Bearer token from the Authorization header, falling back to the session
/// cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| extract_token_from_cookie(headers))
}

/// `Set-Cookie` value for a freshly issued session token.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// Constant-time comparison. An empty expected secret never matches.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

pub fn authenticate(jwt_manager: &JwtManager, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let token = extract_session_token(headers).ok_or(AuthError::MissingAuth)?;
    let claims = jwt_manager.validate_token(&token).map_err(|e| {
        match e {
            JwtError::Expired => tracing::debug!("Session token expired"),
            other => tracing::debug!(error = %other, "Session token rejected"),
        }
        AuthError::InvalidToken
    })?;
    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        session_id: claims.jti,
    })
}

/// Middleware that requires a valid session token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match authenticate(&auth_state.jwt_manager, request.headers()) {
        Ok(auth_user) => {
            tracing::debug!(path = %path, user_id = %auth_user.user_id, "require_auth: authenticated");
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Middleware guarding `/api/admin/*` with `Authorization: Bearer <ADMIN_SECRET>`.
pub async fn require_admin(
    State(admin): State<AdminState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(secret) = admin.admin_secret.as_deref() else {
        tracing::warn!(path = %path, "Admin request rejected: ADMIN_SECRET not configured");
        return AuthError::AdminDisabled.into_response();
    };

    match bearer_token(request.headers()) {
        Some(token) if secrets_match(secret, &token) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %path, "Admin request rejected: wrong secret");
            AuthError::InvalidCredentials.into_response()
        }
        None => AuthError::MissingAuth.into_response(),
    }
}
