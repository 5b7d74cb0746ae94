//! In-memory [`SiteStore`] for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;

use soloboard_shared::models::new_id;
use soloboard_shared::{MonitoredSite, NewSite, SiteMetricsDaily};

use crate::error::MonitorResult;
use crate::store::{SiteOwner, SiteStore, SyncRecord};

#[derive(Clone, Default)]
pub struct InMemorySiteStore {
    inner: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    sites: Vec<MonitoredSite>,
    metrics: Vec<SiteMetricsDaily>,
    owners: HashMap<String, SiteOwner>,
}

fn empty_day(site_id: &str, date: Date) -> SiteMetricsDaily {
    SiteMetricsDaily {
        site_id: site_id.to_string(),
        date,
        revenue: 0,
        visitors: 0,
        uptime_percentage: 100.0,
        response_time: 0,
    }
}

impl State {
    fn day_mut(&mut self, site_id: &str, date: Date) -> &mut SiteMetricsDaily {
        let pos = match self
            .metrics
            .iter()
            .position(|m| m.site_id == site_id && m.date == date)
        {
            Some(pos) => pos,
            None => {
                self.metrics.push(empty_day(site_id, date));
                self.metrics.len() - 1
            }
        };
        &mut self.metrics[pos]
    }
}

impl InMemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_owner(&self, user_id: &str, email: &str, name: &str) {
        self.inner.write().await.owners.insert(
            user_id.to_string(),
            SiteOwner {
                email: email.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub async fn seed_site(&self, site: MonitoredSite) {
        self.inner.write().await.sites.push(site);
    }

    pub async fn seed_metrics(&self, row: SiteMetricsDaily) {
        let mut state = self.inner.write().await;
        state
            .metrics
            .retain(|m| !(m.site_id == row.site_id && m.date == row.date));
        state.metrics.push(row);
    }

    pub async fn all_metrics(&self) -> Vec<SiteMetricsDaily> {
        self.inner.read().await.metrics.clone()
    }
}

#[async_trait]
impl SiteStore for InMemorySiteStore {
    async fn find_site(&self, site_id: &str) -> MonitorResult<Option<MonitoredSite>> {
        let state = self.inner.read().await;
        Ok(state.sites.iter().find(|s| s.id == site_id).cloned())
    }

    async fn sites_for_user(&self, user_id: &str) -> MonitorResult<Vec<MonitoredSite>> {
        let state = self.inner.read().await;
        Ok(state
            .sites
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_sites_for_user(&self, user_id: &str) -> MonitorResult<u32> {
        let state = self.inner.read().await;
        let count = state.sites.iter().filter(|s| s.user_id == user_id).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn active_sites(&self) -> MonitorResult<Vec<MonitoredSite>> {
        let state = self.inner.read().await;
        Ok(state.sites.iter().filter(|s| s.is_active()).cloned().collect())
    }

    async fn sites_by_platform(&self, platform: &str) -> MonitorResult<Vec<MonitoredSite>> {
        let state = self.inner.read().await;
        Ok(state
            .sites
            .iter()
            .filter(|s| s.platform.eq_ignore_ascii_case(platform))
            .cloned()
            .collect())
    }

    async fn insert_site(&self, site: NewSite) -> MonitorResult<MonitoredSite> {
        let now = OffsetDateTime::now_utc();
        let row = MonitoredSite {
            id: new_id(),
            user_id: site.user_id,
            name: site.name,
            domain: site.domain,
            url: site.url,
            logo_url: site.logo_url,
            platform: site.platform,
            api_config: site.api_config,
            status: "active".to_string(),
            last_sync_status: None,
            last_sync_at: None,
            last_sync_error: None,
            last_snapshot: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().await.sites.push(row.clone());
        Ok(row)
    }

    async fn record_sync(&self, site_id: &str, record: SyncRecord) -> MonitorResult<bool> {
        let mut state = self.inner.write().await;
        let Some(site) = state.sites.iter_mut().find(|s| s.id == site_id) else {
            return Ok(false);
        };
        site.last_sync_status = Some(record.status);
        site.last_sync_error = record.error;
        site.last_sync_at = Some(record.at);
        if let Some(snapshot) = record.snapshot {
            site.last_snapshot = Some(snapshot);
        }
        site.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn site_owner(&self, user_id: &str) -> MonitorResult<Option<SiteOwner>> {
        Ok(self.inner.read().await.owners.get(user_id).cloned())
    }

    async fn metrics_for_day(
        &self,
        site_id: &str,
        date: Date,
    ) -> MonitorResult<Option<SiteMetricsDaily>> {
        let state = self.inner.read().await;
        Ok(state
            .metrics
            .iter()
            .find(|m| m.site_id == site_id && m.date == date)
            .cloned())
    }

    async fn metrics_since(
        &self,
        site_id: &str,
        since: Date,
    ) -> MonitorResult<Vec<SiteMetricsDaily>> {
        let state = self.inner.read().await;
        let mut rows: Vec<SiteMetricsDaily> = state
            .metrics
            .iter()
            .filter(|m| m.site_id == site_id && m.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn upsert_uptime(
        &self,
        site_id: &str,
        date: Date,
        uptime_percentage: f64,
        response_time: i32,
    ) -> MonitorResult<()> {
        let mut state = self.inner.write().await;
        let day = state.day_mut(site_id, date);
        day.uptime_percentage = uptime_percentage;
        day.response_time = response_time;
        Ok(())
    }

    async fn add_revenue(&self, site_id: &str, date: Date, cents: i64) -> MonitorResult<i64> {
        let mut state = self.inner.write().await;
        let day = state.day_mut(site_id, date);
        day.revenue += cents;
        Ok(day.revenue)
    }

    async fn increment_visitors(&self, site_id: &str, date: Date) -> MonitorResult<i64> {
        let mut state = self.inner.write().await;
        let day = state.day_mut(site_id, date);
        day.visitors += 1;
        Ok(day.visitors)
    }
}
