//! Authorization for scheduler-triggered endpoints
//!
//! A cron request is accepted when any of these hold:
//! - `?secret=` equals `CRON_SECRET`
//! - `Authorization: Bearer <CRON_SECRET>`
//! - `x-vercel-cron: 1`
//! - `Upstash-Signature` is a valid QStash JWT for the request body
//!
//! An unset or empty `CRON_SECRET` never matches.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::middleware::{bearer_token, secrets_match, AuthError};

pub const VERCEL_CRON_HEADER: &str = "x-vercel-cron";
pub const QSTASH_SIGNATURE_HEADER: &str = "upstash-signature";
const QSTASH_ISSUER: &str = "Upstash";

/// Largest body buffered for signature checks.
const MAX_CRON_BODY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct CronQuery {
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QstashClaims {
    /// base64url SHA-256 of the request body
    body: String,
}

#[derive(Clone, Default)]
pub struct CronAuth {
    secret: Option<String>,
    /// Current then next QStash signing key.
    signing_keys: Vec<String>,
}

impl CronAuth {
    pub fn new(
        secret: Option<String>,
        current_signing_key: Option<String>,
        next_signing_key: Option<String>,
    ) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            signing_keys: [current_signing_key, next_signing_key]
                .into_iter()
                .flatten()
                .filter(|k| !k.trim().is_empty())
                .collect(),
        }
    }

    pub fn authorize(&self, headers: &HeaderMap, query_secret: Option<&str>, body: &[u8]) -> bool {
        if let Some(secret) = self.secret.as_deref() {
            if query_secret.is_some_and(|provided| secrets_match(secret, provided)) {
                return true;
            }
            if bearer_token(headers).is_some_and(|provided| secrets_match(secret, &provided)) {
                return true;
            }
        }

        if headers
            .get(VERCEL_CRON_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "1")
        {
            return true;
        }

        match headers
            .get(QSTASH_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(signature) => self.verify_qstash(signature, body),
            None => false,
        }
    }

    /// Accept the signature if either signing key validates it and the body
    /// hash matches.
    pub fn verify_qstash(&self, signature: &str, body: &[u8]) -> bool {
        let body_hash = URL_SAFE_NO_PAD.encode(Sha256::digest(body));

        self.signing_keys.iter().any(|key| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.set_issuer(&[QSTASH_ISSUER]);
            validation.validate_aud = false;
            validation.validate_nbf = true;
            validation.leeway = 60;

            match decode::<QstashClaims>(signature, &DecodingKey::from_secret(key.as_bytes()), &validation) {
                Ok(data) => data.claims.body.trim_end_matches('=') == body_hash,
                Err(e) => {
                    tracing::debug!(error = %e, "QStash signature rejected by key");
                    false
                }
            }
        })
    }
}

/// Middleware gating `/api/cron/*`. Buffers the body so the QStash body hash
/// can be checked, then hands the request on intact.
pub async fn require_cron(State(auth): State<CronAuth>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let query_secret = Query::<CronQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.secret);

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_CRON_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Cron request body unreadable");
            return AuthError::InvalidCredentials.into_response();
        }
    };

    if !auth.authorize(&parts.headers, query_secret.as_deref(), &bytes) {
        tracing::warn!(path = %path, "Unauthorized cron request");
        return AuthError::InvalidCredentials.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use time::OffsetDateTime;

    #[derive(Serialize)]
    struct SignedClaims<'a> {
        iss: &'a str,
        sub: &'a str,
        exp: i64,
        nbf: i64,
        iat: i64,
        jti: &'a str,
        body: String,
    }

    fn qstash_signature(key: &str, body: &[u8]) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = SignedClaims {
            iss: "Upstash",
            sub: "https://soloboard.app/api/cron/sync-sites",
            exp: now + 300,
            nbf: now - 1,
            iat: now,
            jti: "msg_1",
            body: URL_SAFE_NO_PAD.encode(Sha256::digest(body)),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    fn auth() -> CronAuth {
        CronAuth::new(
            Some("cron-secret".into()),
            Some("sig_current".into()),
            Some("sig_next".into()),
        )
    }

    #[test]
    fn query_and_bearer_secret() {
        let auth = auth();
        assert!(auth.authorize(&HeaderMap::new(), Some("cron-secret"), b""));
        assert!(!auth.authorize(&HeaderMap::new(), Some("wrong"), b""));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer cron-secret"));
        assert!(auth.authorize(&headers, None, b""));
    }

    #[test]
    fn empty_secret_never_matches() {
        let auth = CronAuth::new(Some("".into()), None, None);
        assert!(!auth.authorize(&HeaderMap::new(), Some(""), b""));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(!auth.authorize(&headers, None, b""));
    }

    #[test]
    fn vercel_header() {
        let auth = CronAuth::default();
        let mut headers = HeaderMap::new();
        headers.insert(VERCEL_CRON_HEADER, HeaderValue::from_static("1"));
        assert!(auth.authorize(&headers, None, b""));

        headers.insert(VERCEL_CRON_HEADER, HeaderValue::from_static("0"));
        assert!(!auth.authorize(&headers, None, b""));
    }

    #[test]
    fn qstash_current_or_next_key() {
        let auth = auth();
        let body = br#"{"trigger":"schedule"}"#;

        assert!(auth.verify_qstash(&qstash_signature("sig_current", body), body));
        assert!(auth.verify_qstash(&qstash_signature("sig_next", body), body));
        assert!(!auth.verify_qstash(&qstash_signature("sig_other", body), body));
    }

    #[test]
    fn qstash_body_must_match() {
        let auth = auth();
        let signature = qstash_signature("sig_current", b"original");
        assert!(!auth.verify_qstash(&signature, b"tampered"));

        let mut headers = HeaderMap::new();
        headers.insert(
            QSTASH_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).unwrap(),
        );
        assert!(auth.authorize(&headers, None, b"original"));
    }
}
