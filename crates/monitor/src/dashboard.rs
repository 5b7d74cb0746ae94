//! Owner dashboard: per-site health, today's numbers, weekly averages

use futures::future::try_join_all;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use soloboard_shared::{MonitoredSite, SyncStatus, UptimeStatus};

use crate::anomaly::{detect_anomaly, history_start, Alert, DayMetrics, HistoricalAverage, SiteHealth};
use crate::error::MonitorResult;
use crate::store::SiteStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSite {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub logo_url: Option<String>,
    pub status: SiteHealth,
    pub alert: Option<Alert>,
    pub today_revenue: i64,
    pub today_visitors: i64,
    pub avg_revenue_7d: f64,
    pub avg_visitors_7d: f64,
    pub platforms: Vec<String>,
    pub response_time: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_sites: usize,
    pub total_revenue: i64,
    pub total_visitors: i64,
    pub sites_online: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub sites: Vec<DashboardSite>,
    pub summary: DashboardSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

/// Keys of `api_config.platforms`, or the site's own platform.
fn platforms(site: &MonitoredSite) -> Vec<String> {
    match site.api_config.get("platforms").and_then(|p| p.as_object()) {
        Some(map) if !map.is_empty() => map.keys().cloned().collect(),
        _ => vec![site.platform.clone()],
    }
}

pub struct DashboardService<'a> {
    store: &'a dyn SiteStore,
}

impl<'a> DashboardService<'a> {
    pub fn new(store: &'a dyn SiteStore) -> Self {
        Self { store }
    }

    pub async fn for_user(&self, user_id: &str) -> MonitorResult<Dashboard> {
        self.for_user_on(user_id, OffsetDateTime::now_utc().date())
            .await
    }

    pub async fn for_user_on(&self, user_id: &str, today: Date) -> MonitorResult<Dashboard> {
        let sites = self.store.sites_for_user(user_id).await?;
        let rows = try_join_all(sites.iter().map(|site| self.site_row(site, today))).await?;

        let summary = DashboardSummary {
            total_sites: rows.len(),
            total_revenue: rows.iter().map(|s| s.today_revenue).sum(),
            total_visitors: rows.iter().map(|s| s.today_visitors).sum(),
            sites_online: rows
                .iter()
                .filter(|s| s.status == SiteHealth::Online)
                .count(),
        };

        Ok(Dashboard {
            sites: rows,
            summary,
            last_updated: OffsetDateTime::now_utc(),
        })
    }

    async fn site_row(&self, site: &MonitoredSite, today: Date) -> MonitorResult<DashboardSite> {
        let history_rows = self
            .store
            .metrics_since(&site.id, history_start(today))
            .await?;
        let history = HistoricalAverage::trailing_week(&history_rows, today);
        let today_row = history_rows.iter().find(|r| r.date == today);

        let uptime = match site.last_sync_status {
            Some(SyncStatus::Error) => UptimeStatus::Down,
            _ => UptimeStatus::Up,
        };
        let day = DayMetrics {
            revenue: today_row.map(|r| r.revenue).unwrap_or(0),
            visitors: today_row.map(|r| r.visitors).unwrap_or(0),
            uptime,
        };
        let anomaly = detect_anomaly(&day, &history);

        Ok(DashboardSite {
            id: site.id.clone(),
            name: site.name.clone(),
            domain: site.domain.clone(),
            logo_url: site.logo_url.clone(),
            status: anomaly.status,
            alert: anomaly.alert,
            today_revenue: day.revenue,
            today_visitors: day.visitors,
            avg_revenue_7d: history.avg_revenue_7d,
            avg_visitors_7d: history.avg_visitors_7d,
            platforms: platforms(site),
            response_time: today_row.map(|r| r.response_time).unwrap_or(0),
        })
    }
}
