//! Unit tests for authentication middleware
//!
//! Tests cover:
//! - Session token from header and cookie
//! - Missing, malformed and foreign tokens
//! - Admin bearer secret, including the closed-when-unset case

#[cfg(test)]
mod tests {
    use super::super::jwt::JwtManager;
    use super::super::middleware::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    const JWT_SECRET: &str = "test-jwt-secret-key-for-testing-only";

    fn auth_state() -> AuthState {
        AuthState {
            jwt_manager: JwtManager::new(JWT_SECRET, 24),
        }
    }

    async fn whoami(Extension(user): Extension<AuthUser>) -> String {
        user.user_id
    }

    fn protected_app() -> Router {
        Router::new()
            .route("/me", get(whoami))
            .layer(middleware::from_fn_with_state(auth_state(), require_auth))
    }

    fn admin_app(secret: Option<&str>) -> Router {
        Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                AdminState {
                    admin_secret: secret.map(str::to_string),
                },
                require_admin,
            ))
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_authenticates() {
        let (token, _) = auth_state()
            .jwt_manager
            .generate_token("user-42", "u@example.com")
            .unwrap();

        let response = protected_app()
            .oneshot(
                Request::get("/me")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "user-42");
    }

    #[tokio::test]
    async fn test_session_cookie_authenticates() {
        let (token, _) = auth_state()
            .jwt_manager
            .generate_token("user-7", "u@example.com")
            .unwrap();

        let response = protected_app()
            .oneshot(
                Request::get("/me")
                    .header("cookie", format!("theme=dark; {}={}", SESSION_COOKIE, token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "user-7");
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let response = protected_app()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Authentication required"));
    }

    #[tokio::test]
    async fn test_token_signed_elsewhere_is_401() {
        let (token, _) = JwtManager::new("some-other-secret-entirely-different", 24)
            .generate_token("user-1", "u@example.com")
            .unwrap();

        let response = protected_app()
            .oneshot(
                Request::get("/me")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_secret_required() {
        let ok = admin_app(Some("admin-s3cret"))
            .oneshot(
                Request::get("/admin")
                    .header("authorization", "Bearer admin-s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let wrong = admin_app(Some("admin-s3cret"))
            .oneshot(
                Request::get("/admin")
                    .header("authorization", "Bearer admin-guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let missing = admin_app(Some("admin-s3cret"))
            .oneshot(Request::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_closed_when_secret_unset() {
        let response = admin_app(None)
            .oneshot(
                Request::get("/admin")
                    .header("authorization", "Bearer ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
