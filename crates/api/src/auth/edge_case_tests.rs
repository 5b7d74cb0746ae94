//! Edge Case Tests for Authentication
//!
//! Tests boundary conditions in:
//! - Session token handling (AUTH-J01 to AUTH-J04)
//! - Token extraction from headers and cookies (AUTH-C01 to AUTH-C04)
//! - Secret comparison (AUTH-K01 to AUTH-K03)

#[cfg(test)]
mod jwt_tests {
    use super::super::jwt::*;

    const TEST_SECRET: &str = "test-secret-key-at-least-32-chars!";

    // =========================================================================
    // AUTH-J01: Fresh token validates immediately
    // =========================================================================
    #[test]
    fn test_fresh_token_is_valid() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let (token, _) = jwt
            .generate_token("user-1", "test@example.com")
            .expect("Should generate token");
        assert!(jwt.validate_token(&token).is_ok(), "Fresh token should be valid");
    }

    // =========================================================================
    // AUTH-J02: Every token gets its own jti
    // =========================================================================
    #[test]
    fn test_jti_is_unique_per_token() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let (_, a) = jwt.generate_token("user-1", "test@example.com").unwrap();
        let (_, b) = jwt.generate_token("user-1", "test@example.com").unwrap();
        assert_ne!(a, b);
    }

    // =========================================================================
    // AUTH-J03: Tampered payload fails signature check
    // =========================================================================
    #[test]
    fn test_tampered_token_rejected() {
        let jwt = JwtManager::new(TEST_SECRET, 24);
        let (token, _) = jwt.generate_token("user-1", "test@example.com").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = "eyJzdWIiOiJhZG1pbiJ9";
        let forged = parts.join(".");
        assert!(matches!(jwt.validate_token(&forged), Err(JwtError::Invalid)));
    }

    // =========================================================================
    // AUTH-J04: Expiry follows the configured hours
    // =========================================================================
    #[test]
    fn test_expiry_matches_configuration() {
        let jwt = JwtManager::new(TEST_SECRET, 168);
        assert_eq!(jwt.expiry_secs(), 168 * 3600);
        let (token, _) = jwt.generate_token("user-1", "test@example.com").unwrap();
        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 168 * 3600);
    }
}

#[cfg(test)]
mod extraction_tests {
    use super::super::middleware::*;
    use axum::http::{HeaderMap, HeaderValue};

    // =========================================================================
    // AUTH-C01: Header wins over cookie
    // =========================================================================
    #[test]
    fn test_header_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        headers.insert("cookie", HeaderValue::from_static("soloboard_session=from-cookie"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("from-header"));
    }

    // =========================================================================
    // AUTH-C02: Cookie with a similar name is ignored
    // =========================================================================
    #[test]
    fn test_prefixed_cookie_name_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("soloboard_session_old=stale; other=1"),
        );
        assert_eq!(extract_session_token(&headers), None);
    }

    // =========================================================================
    // AUTH-C03: Empty bearer falls back to cookie
    // =========================================================================
    #[test]
    fn test_empty_bearer_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        headers.insert("cookie", HeaderValue::from_static("soloboard_session=abc"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }

    // =========================================================================
    // AUTH-C04: Session cookie attributes
    // =========================================================================
    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", 3600);
        assert!(cookie.starts_with("soloboard_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
    }
}

#[cfg(test)]
mod secret_tests {
    use super::super::middleware::secrets_match;

    // =========================================================================
    // AUTH-K01: Empty expected secret never matches
    // =========================================================================
    #[test]
    fn test_empty_secret_never_matches() {
        assert!(!secrets_match("", ""));
        assert!(!secrets_match("", "anything"));
    }

    // =========================================================================
    // AUTH-K02: Prefix of the secret does not match
    // =========================================================================
    #[test]
    fn test_prefix_does_not_match() {
        assert!(!secrets_match("long-secret", "long"));
        assert!(!secrets_match("long-secret", "long-secret-and-more"));
    }

    // =========================================================================
    // AUTH-K03: Exact secret matches
    // =========================================================================
    #[test]
    fn test_exact_match() {
        assert!(secrets_match("long-secret", "long-secret"));
    }
}
