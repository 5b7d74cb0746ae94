//! Site management: listing, plan-limited creation, visitor tracking

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use soloboard_shared::{can_add_more_sites, MonitoredSite, NewSite, PlanTier, SiteAllowance, SyncStatus};

use crate::error::{MonitorError, MonitorResult};
use crate::store::SiteStore;

pub const DEFAULT_PLATFORM: &str = "UPTIME";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSiteRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub platform: Option<String>,
    pub logo_url: Option<String>,
    pub api_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Offline,
    Unknown,
}

impl HealthStatus {
    pub fn of(site: &MonitoredSite) -> Self {
        match site.last_sync_status {
            Some(SyncStatus::Success) => HealthStatus::Online,
            Some(SyncStatus::Error) => HealthStatus::Offline,
            None => HealthStatus::Unknown,
        }
    }
}

/// A site as shown to its owner. API config is never echoed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub id: String,
    pub name: String,
    pub url: String,
    pub domain: String,
    pub logo_url: Option<String>,
    pub platform: String,
    pub status: String,
    pub health_status: HealthStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&MonitoredSite> for SiteView {
    fn from(site: &MonitoredSite) -> Self {
        Self {
            id: site.id.clone(),
            name: site.name.clone(),
            url: crate::sync::site_url(site),
            domain: site.domain.clone(),
            logo_url: site.logo_url.clone(),
            platform: site.platform.clone(),
            status: site.status.clone(),
            health_status: HealthStatus::of(site),
            last_sync_at: site.last_sync_at,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteListing {
    pub sites: Vec<SiteView>,
    pub total: usize,
    pub subscription: SiteAllowance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedSite {
    pub site: SiteView,
    pub subscription: SiteAllowance,
}

/// `https://` is assumed when the scheme is missing.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// Host of the url, or the url stripped of scheme and trailing slash when it
/// does not parse.
pub fn derive_domain(raw: &str) -> String {
    let normalized = normalize_url(raw);
    match url::Url::parse(&normalized) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.to_string(),
            None => strip_scheme(raw),
        },
        Err(_) => strip_scheme(raw),
    }
}

fn strip_scheme(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

pub struct SiteService<'a> {
    store: &'a dyn SiteStore,
}

impl<'a> SiteService<'a> {
    pub fn new(store: &'a dyn SiteStore) -> Self {
        Self { store }
    }

    pub async fn list_for_user(&self, user_id: &str, tier: PlanTier) -> MonitorResult<SiteListing> {
        let sites = self.store.sites_for_user(user_id).await?;
        let count = u32::try_from(sites.len()).unwrap_or(u32::MAX);
        let views: Vec<SiteView> = sites.iter().map(SiteView::from).collect();
        Ok(SiteListing {
            total: views.len(),
            sites: views,
            subscription: can_add_more_sites(count, tier),
        })
    }

    /// Validate, enforce the plan's site limit, insert.
    pub async fn add_site(
        &self,
        user_id: &str,
        tier: PlanTier,
        request: AddSiteRequest,
    ) -> MonitorResult<AddedSite> {
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let (Some(name), Some(url)) = (name, url) else {
            return Err(MonitorError::InvalidInput(
                "Missing required fields: name, url".to_string(),
            ));
        };

        let count = self.store.count_sites_for_user(user_id).await?;
        let allowance = can_add_more_sites(count, tier);
        if !allowance.can_add {
            tracing::info!(
                user_id = %user_id,
                tier = %tier,
                current_count = count,
                "Site limit reached"
            );
            return Err(MonitorError::SiteLimitReached {
                plan: allowance.plan_display_name,
                current_count: count,
                limit: allowance.limit.unwrap_or(count),
            });
        }

        let domain = request
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| derive_domain(url));
        let platform = request
            .platform
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PLATFORM)
            .to_ascii_uppercase();

        let site = self
            .store
            .insert_site(NewSite {
                user_id: user_id.to_string(),
                name: name.to_string(),
                domain,
                url: normalize_url(url),
                logo_url: request.logo_url,
                platform,
                api_config: request
                    .api_config
                    .unwrap_or_else(|| serde_json::json!({})),
            })
            .await?;

        tracing::info!(user_id = %user_id, site_id = %site.id, domain = %site.domain, "Site added");

        Ok(AddedSite {
            site: SiteView::from(&site),
            subscription: can_add_more_sites(count + 1, tier),
        })
    }

    /// Count a page view for today.
    pub async fn record_visit(&self, site_id: &str) -> MonitorResult<i64> {
        if self.store.find_site(site_id).await?.is_none() {
            return Err(MonitorError::SiteNotFound(site_id.to_string()));
        }
        self.store
            .increment_visitors(site_id, OffsetDateTime::now_utc().date())
            .await
    }
}
