//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use soloboard_billing::{BillingService, BillingStore, CreemConfig, PgBillingStore};
use soloboard_monitor::{
    EmailConfig, Mailer, MonitorService, PgSiteStore, ResendMailer, SiteStore, UptimeProbe,
    DEFAULT_PROBE_TIMEOUT,
};

use crate::{
    auth::{CronAuth, JwtManager},
    config::Config,
    error::{ApiError, ApiResult},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
    pub sites: Arc<dyn SiteStore>,
    pub monitor: Arc<MonitorService>,
    pub cron_auth: CronAuth,
}

/// External integrations the state is built with.
pub struct Integrations {
    pub creem: CreemConfig,
    pub email: EmailConfig,
}

impl Integrations {
    pub fn from_env() -> Self {
        Self {
            creem: CreemConfig::from_env(),
            email: EmailConfig::from_env(),
        }
    }
}

impl AppState {
    /// State backed by Postgres with integrations read from the environment.
    pub fn new(pool: PgPool, config: Config) -> ApiResult<Self> {
        let billing_store: Arc<dyn BillingStore> = Arc::new(PgBillingStore::new(pool.clone()));
        let site_store: Arc<dyn SiteStore> = Arc::new(PgSiteStore::new(pool.clone()));
        Self::with_stores(
            pool,
            config,
            billing_store,
            site_store,
            Integrations::from_env(),
        )
    }

    pub fn with_stores(
        pool: PgPool,
        config: Config,
        billing_store: Arc<dyn BillingStore>,
        site_store: Arc<dyn SiteStore>,
        integrations: Integrations,
    ) -> ApiResult<Self> {
        let jwt_manager = JwtManager::new(&config.auth_secret, config.jwt_expiry_hours);

        if integrations.creem.checkout_enabled() {
            tracing::info!(
                environment = ?integrations.creem.environment,
                "Creem checkout enabled"
            );
        } else {
            tracing::warn!("Creem checkout not configured (missing CREEM_API_KEY)");
        }
        if !integrations.creem.webhooks_enabled() {
            tracing::warn!("Creem webhooks not configured (missing CREEM_SIGNING_SECRET) - deliveries will be rejected");
        }

        let billing = BillingService::new(
            billing_store,
            integrations.creem,
            config.app_url.clone(),
        )
        .map_err(ApiError::from)?;

        let sender = integrations.email.sender.clone();
        let mailer: Option<Arc<dyn Mailer>> = if integrations.email.api_key.is_some() {
            tracing::info!("Alert emails enabled via Resend");
            Some(Arc::new(ResendMailer::new(integrations.email).map_err(ApiError::from)?))
        } else {
            tracing::warn!("Alert emails not configured (missing RESEND_API_KEY)");
            None
        };

        let probe = UptimeProbe::new(DEFAULT_PROBE_TIMEOUT).map_err(ApiError::from)?;
        let monitor = MonitorService::new(site_store.clone(), probe, mailer, sender);

        if config.cron_secret.is_none() {
            tracing::warn!("CRON_SECRET not set - cron endpoints only accept Vercel or QStash callers");
        }
        if config.admin_secret.is_none() {
            tracing::warn!("ADMIN_SECRET not set - admin endpoints are disabled");
        }
        let cron_auth = CronAuth::new(
            config.cron_secret.clone(),
            config.qstash_current_signing_key.clone(),
            config.qstash_next_signing_key.clone(),
        );

        Ok(Self {
            pool,
            config,
            jwt_manager,
            billing: Arc::new(billing),
            sites: site_store,
            monitor: Arc::new(monitor),
            cron_auth,
        })
    }

    pub fn billing_store(&self) -> &dyn BillingStore {
        self.billing.store.as_ref()
    }
}
