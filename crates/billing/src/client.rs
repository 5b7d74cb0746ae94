//! Creem API client

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use soloboard_shared::PlanTier;

use crate::error::{BillingError, BillingResult};

pub const SANDBOX_API_BASE: &str = "https://test-api.creem.io";
pub const PRODUCTION_API_BASE: &str = "https://api.creem.io";

const MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreemEnvironment {
    Sandbox,
    Production,
}

impl CreemEnvironment {
    /// Anything other than `sandbox` is production.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "sandbox" || s == "test" => CreemEnvironment::Sandbox,
            _ => CreemEnvironment::Production,
        }
    }

    pub fn api_base(&self) -> &'static str {
        match self {
            CreemEnvironment::Sandbox => SANDBOX_API_BASE,
            CreemEnvironment::Production => PRODUCTION_API_BASE,
        }
    }
}

/// Creem product ids per paid tier
#[derive(Debug, Clone, Default)]
pub struct ProductIds {
    pub base: Option<String>,
    pub pro: Option<String>,
}

impl ProductIds {
    pub fn for_tier(&self, tier: PlanTier) -> Option<&str> {
        match tier {
            PlanTier::Free => None,
            PlanTier::Base => self.base.as_deref(),
            PlanTier::Pro => self.pro.as_deref(),
        }
    }
}

/// Creem configuration
#[derive(Debug, Clone)]
pub struct CreemConfig {
    pub api_key: Option<String>,
    pub signing_secret: Option<String>,
    pub environment: CreemEnvironment,
    pub product_ids: ProductIds,
    /// Overrides the environment's API base (tests).
    pub api_base: Option<String>,
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl CreemConfig {
    /// Load from `CREEM_*` environment variables. Missing values disable the
    /// corresponding feature rather than failing.
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_env("CREEM_API_KEY"),
            signing_secret: non_empty_env("CREEM_SIGNING_SECRET"),
            environment: CreemEnvironment::parse(non_empty_env("CREEM_ENVIRONMENT").as_deref()),
            product_ids: ProductIds {
                base: non_empty_env("CREEM_PRODUCT_ID_BASE"),
                pro: non_empty_env("CREEM_PRODUCT_ID_PRO"),
            },
            api_base: None,
        }
    }

    pub fn checkout_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn webhooks_enabled(&self) -> bool {
        self.signing_secret.is_some()
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CheckoutCustomer>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutCustomer {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_url: String,
}

/// Thin client over the Creem REST API
#[derive(Clone)]
pub struct CreemClient {
    http: reqwest::Client,
    config: CreemConfig,
}

impl CreemClient {
    pub fn new(config: CreemConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BillingError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CreemConfig {
        &self.config
    }

    /// `POST /v1/checkouts`. Connection errors and 5xx responses are retried
    /// with exponential backoff.
    pub async fn create_checkout(&self, request: &CheckoutRequest) -> BillingResult<CheckoutSession> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(BillingError::NotConfigured)?;
        let url = format!("{}/v1/checkouts", self.config.api_base());

        let strategy = ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(MAX_RETRIES);

        let session = RetryIf::start(
            strategy,
            || self.post_checkout(&url, api_key, request),
            |e: &Attempt| matches!(e, Attempt::Transient(_)),
        )
        .await
        .map_err(Attempt::into_error)?;

        tracing::info!(
            checkout_id = %session.id,
            request_id = %request.request_id,
            "Creem checkout created"
        );
        Ok(session)
    }

    async fn post_checkout(
        &self,
        url: &str,
        api_key: &str,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, Attempt> {
        let response = self
            .http
            .post(url)
            .header("x-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Creem request failed");
                Attempt::Transient(BillingError::from(e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = BillingError::Provider(format!("{}: {}", status, body));
            tracing::warn!(status = %status, "Creem returned an error");
            return Err(if status.is_server_error() {
                Attempt::Transient(err)
            } else {
                Attempt::Permanent(err)
            });
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| Attempt::Permanent(BillingError::Provider(format!("bad checkout response: {}", e))))
    }
}

enum Attempt {
    Transient(BillingError),
    Permanent(BillingError),
}

impl Attempt {
    fn into_error(self) -> BillingError {
        match self {
            Attempt::Transient(e) | Attempt::Permanent(e) => e,
        }
    }
}
