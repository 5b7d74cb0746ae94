//! Persistence seam for monitored sites and their daily metrics
//!
//! [`PgSiteStore`] backs production; [`crate::memory::InMemorySiteStore`]
//! backs tests.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};

use soloboard_shared::models::new_id;
use soloboard_shared::{MonitoredSite, NewSite, SiteMetricsDaily, SyncStatus};

use crate::error::MonitorResult;

/// Who gets alert emails for a site.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SiteOwner {
    pub email: String,
    pub name: String,
}

/// Outcome of one sync written back onto the site row.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub status: SyncStatus,
    pub error: Option<String>,
    /// Left untouched when `None`.
    pub snapshot: Option<serde_json::Value>,
    pub at: OffsetDateTime,
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn find_site(&self, site_id: &str) -> MonitorResult<Option<MonitoredSite>>;
    /// Newest first.
    async fn sites_for_user(&self, user_id: &str) -> MonitorResult<Vec<MonitoredSite>>;
    async fn count_sites_for_user(&self, user_id: &str) -> MonitorResult<u32>;
    /// Sites with status `active`.
    async fn active_sites(&self) -> MonitorResult<Vec<MonitoredSite>>;
    async fn sites_by_platform(&self, platform: &str) -> MonitorResult<Vec<MonitoredSite>>;
    async fn insert_site(&self, site: NewSite) -> MonitorResult<MonitoredSite>;
    async fn record_sync(&self, site_id: &str, record: SyncRecord) -> MonitorResult<bool>;
    async fn site_owner(&self, user_id: &str) -> MonitorResult<Option<SiteOwner>>;

    // Daily metrics
    async fn metrics_for_day(
        &self,
        site_id: &str,
        date: Date,
    ) -> MonitorResult<Option<SiteMetricsDaily>>;
    /// Rows with `date >= since`, newest first.
    async fn metrics_since(&self, site_id: &str, since: Date)
        -> MonitorResult<Vec<SiteMetricsDaily>>;
    /// Write uptime and response time for the day, keeping revenue and visitors.
    async fn upsert_uptime(
        &self,
        site_id: &str,
        date: Date,
        uptime_percentage: f64,
        response_time: i32,
    ) -> MonitorResult<()>;
    /// Add to the day's revenue. Returns the new total.
    async fn add_revenue(&self, site_id: &str, date: Date, cents: i64) -> MonitorResult<i64>;
    /// Bump the day's visitor counter. Returns the new count.
    async fn increment_visitors(&self, site_id: &str, date: Date) -> MonitorResult<i64>;
}

/// Postgres-backed [`SiteStore`]
#[derive(Clone)]
pub struct PgSiteStore {
    pool: PgPool,
}

impl PgSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SITE_COLUMNS: &str = r#"id, user_id, name, domain, url, logo_url, platform, api_config,
    status, last_sync_status, last_sync_at, last_sync_error, last_snapshot,
    created_at, updated_at"#;

const METRIC_COLUMNS: &str = "site_id, date, revenue, visitors, uptime_percentage, response_time";

#[async_trait]
impl SiteStore for PgSiteStore {
    async fn find_site(&self, site_id: &str) -> MonitorResult<Option<MonitoredSite>> {
        let site = sqlx::query_as(&format!(
            "SELECT {SITE_COLUMNS} FROM monitored_sites WHERE id = $1"
        ))
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    async fn sites_for_user(&self, user_id: &str) -> MonitorResult<Vec<MonitoredSite>> {
        let sites = sqlx::query_as(&format!(
            "SELECT {SITE_COLUMNS} FROM monitored_sites WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    async fn count_sites_for_user(&self, user_id: &str) -> MonitorResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM monitored_sites WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn active_sites(&self) -> MonitorResult<Vec<MonitoredSite>> {
        let sites = sqlx::query_as(&format!(
            "SELECT {SITE_COLUMNS} FROM monitored_sites WHERE status = 'active' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    async fn sites_by_platform(&self, platform: &str) -> MonitorResult<Vec<MonitoredSite>> {
        let sites = sqlx::query_as(&format!(
            "SELECT {SITE_COLUMNS} FROM monitored_sites WHERE UPPER(platform) = UPPER($1)"
        ))
        .bind(platform)
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    async fn insert_site(&self, site: NewSite) -> MonitorResult<MonitoredSite> {
        let row = sqlx::query_as(&format!(
            r#"
            INSERT INTO monitored_sites (id, user_id, name, domain, url, logo_url, platform, api_config, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active')
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(new_id())
        .bind(&site.user_id)
        .bind(&site.name)
        .bind(&site.domain)
        .bind(&site.url)
        .bind(&site.logo_url)
        .bind(&site.platform)
        .bind(&site.api_config)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_sync(&self, site_id: &str, record: SyncRecord) -> MonitorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE monitored_sites
            SET last_sync_status = $1,
                last_sync_error = $2,
                last_sync_at = $3,
                last_snapshot = COALESCE($4, last_snapshot),
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(record.status)
        .bind(&record.error)
        .bind(record.at)
        .bind(&record.snapshot)
        .bind(site_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn site_owner(&self, user_id: &str) -> MonitorResult<Option<SiteOwner>> {
        let owner = sqlx::query_as("SELECT email, name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn metrics_for_day(
        &self,
        site_id: &str,
        date: Date,
    ) -> MonitorResult<Option<SiteMetricsDaily>> {
        let row = sqlx::query_as(&format!(
            "SELECT {METRIC_COLUMNS} FROM site_metrics_daily WHERE site_id = $1 AND date = $2"
        ))
        .bind(site_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn metrics_since(
        &self,
        site_id: &str,
        since: Date,
    ) -> MonitorResult<Vec<SiteMetricsDaily>> {
        let rows = sqlx::query_as(&format!(
            r#"
            SELECT {METRIC_COLUMNS} FROM site_metrics_daily
            WHERE site_id = $1 AND date >= $2
            ORDER BY date DESC
            "#
        ))
        .bind(site_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_uptime(
        &self,
        site_id: &str,
        date: Date,
        uptime_percentage: f64,
        response_time: i32,
    ) -> MonitorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO site_metrics_daily (site_id, date, uptime_percentage, response_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (site_id, date) DO UPDATE
            SET uptime_percentage = EXCLUDED.uptime_percentage,
                response_time = EXCLUDED.response_time
            "#,
        )
        .bind(site_id)
        .bind(date)
        .bind(uptime_percentage)
        .bind(response_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_revenue(&self, site_id: &str, date: Date, cents: i64) -> MonitorResult<i64> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO site_metrics_daily (site_id, date, revenue)
            VALUES ($1, $2, $3)
            ON CONFLICT (site_id, date) DO UPDATE
            SET revenue = site_metrics_daily.revenue + EXCLUDED.revenue
            RETURNING revenue
            "#,
        )
        .bind(site_id)
        .bind(date)
        .bind(cents)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn increment_visitors(&self, site_id: &str, date: Date) -> MonitorResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO site_metrics_daily (site_id, date, visitors)
            VALUES ($1, $2, 1)
            ON CONFLICT (site_id, date) DO UPDATE
            SET visitors = site_metrics_daily.visitors + 1
            RETURNING visitors
            "#,
        )
        .bind(site_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
