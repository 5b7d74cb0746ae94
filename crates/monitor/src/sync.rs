//! Scheduled sync run and alert sweep
//!
//! A run probes every active site concurrently, writes today's uptime row and
//! the site's sync status, then compares each site against its trailing week
//! and sends at most one alert email per site.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use soloboard_shared::{MonitoredSite, SiteSnapshot, SyncStatus, UptimeStatus};

use crate::alerts::{AlertDetails, AlertNotice, Mailer};
use crate::anomaly::{detect_anomaly, history_start, AlertType, DayMetrics, HistoricalAverage};
use crate::error::{MonitorError, MonitorResult};
use crate::probe::UptimeProbe;
use crate::store::{SiteStore, SyncRecord};

/// Sites probed at once.
pub const SYNC_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSyncResult {
    pub site_id: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<SiteSyncResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCounts {
    pub downtime: usize,
    pub no_sales: usize,
    pub traffic_drop: usize,
    pub total: usize,
}

impl AlertCounts {
    fn record(&mut self, alert_type: AlertType) {
        match alert_type {
            AlertType::SiteDown => self.downtime += 1,
            AlertType::NoSales => self.no_sales += 1,
            AlertType::LowTraffic => self.traffic_drop += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub sites_checked: usize,
    pub alerts_sent: AlertCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRun {
    pub sync: SyncSummary,
    pub alerts: AlertSummary,
}

#[derive(Clone)]
pub struct MonitorService {
    store: Arc<dyn SiteStore>,
    probe: UptimeProbe,
    mailer: Option<Arc<dyn Mailer>>,
    sender: String,
}

impl MonitorService {
    pub fn new(
        store: Arc<dyn SiteStore>,
        probe: UptimeProbe,
        mailer: Option<Arc<dyn Mailer>>,
        sender: String,
    ) -> Self {
        Self {
            store,
            probe,
            mailer,
            sender,
        }
    }

    pub fn store(&self) -> &dyn SiteStore {
        self.store.as_ref()
    }

    pub fn alerts_enabled(&self) -> bool {
        self.mailer.as_ref().is_some_and(|m| m.is_enabled())
    }

    /// Sync every active site, then run the alert sweep.
    pub async fn run(&self) -> MonitorResult<SyncRun> {
        let sync = self.sync_all().await?;
        tracing::info!(
            total = sync.total,
            succeeded = sync.succeeded,
            failed = sync.failed,
            "Site sync completed"
        );
        let alerts = self.check_and_send_alerts().await?;
        tracing::info!(
            sites_checked = alerts.sites_checked,
            alerts_sent = alerts.alerts_sent.total,
            "Alert check completed"
        );
        Ok(SyncRun { sync, alerts })
    }

    pub async fn sync_all(&self) -> MonitorResult<SyncSummary> {
        let sites = self.store.active_sites().await?;
        let today = OffsetDateTime::now_utc().date();

        let results: Vec<SiteSyncResult> = stream::iter(sites)
            .map(|site| self.sync_site(site, today))
            .buffer_unordered(SYNC_CONCURRENCY)
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|r| r.status == SyncStatus::Success)
            .count();
        Ok(SyncSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        })
    }

    /// Never fails: errors become an `error` result on the site.
    async fn sync_site(&self, site: MonitoredSite, today: Date) -> SiteSyncResult {
        match self.try_sync_site(&site, today).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(site_id = %site.id, site = %site.name, error = %e, "Site sync failed");
                let message = e.to_string();
                let record = SyncRecord {
                    status: SyncStatus::Error,
                    error: Some(message.clone()),
                    snapshot: None,
                    at: OffsetDateTime::now_utc(),
                };
                if let Err(write_err) = self.store.record_sync(&site.id, record).await {
                    tracing::error!(
                        site_id = %site.id,
                        error = %write_err,
                        "Failed to record sync error"
                    );
                }
                SiteSyncResult {
                    site_id: site.id,
                    status: SyncStatus::Error,
                    error: Some(message),
                    response_time_ms: None,
                }
            }
        }
    }

    async fn try_sync_site(&self, site: &MonitoredSite, today: Date) -> MonitorResult<SiteSyncResult> {
        let probe = self.probe.check(&site.url).await;
        let day = self.store.metrics_for_day(&site.id, today).await?;
        let (revenue_today, visitors_today) =
            day.map(|d| (d.revenue, d.visitors)).unwrap_or((0, 0));

        let uptime_percentage = if probe.is_up() { 100.0 } else { 0.0 };
        let response_time = probe
            .response_time_ms
            .map(|ms| i32::try_from(ms).unwrap_or(i32::MAX))
            .unwrap_or(0);
        self.store
            .upsert_uptime(&site.id, today, uptime_percentage, response_time)
            .await?;

        let now = OffsetDateTime::now_utc();
        let snapshot = SiteSnapshot {
            revenue_today,
            visitors_today,
            uptime: probe.status,
            response_time_ms: probe.response_time_ms,
            synced_at: now,
        };
        let status = if probe.is_up() {
            SyncStatus::Success
        } else {
            SyncStatus::Error
        };
        let snapshot =
            serde_json::to_value(&snapshot).map_err(|e| MonitorError::Internal(e.to_string()))?;
        self.store
            .record_sync(
                &site.id,
                SyncRecord {
                    status,
                    error: probe.error.clone(),
                    snapshot: Some(snapshot),
                    at: now,
                },
            )
            .await?;

        tracing::debug!(
            site_id = %site.id,
            status = %status,
            response_time_ms = ?probe.response_time_ms,
            "Site synced"
        );

        Ok(SiteSyncResult {
            site_id: site.id.clone(),
            status,
            error: probe.error,
            response_time_ms: probe.response_time_ms,
        })
    }

    /// Classify every active site and email its owner. Per-site failures are
    /// logged and skipped.
    pub async fn check_and_send_alerts(&self) -> MonitorResult<AlertSummary> {
        let sites = self.store.active_sites().await?;
        let today = OffsetDateTime::now_utc().date();
        let mut summary = AlertSummary {
            sites_checked: sites.len(),
            alerts_sent: AlertCounts::default(),
        };

        let Some(mailer) = self.mailer.as_ref().filter(|m| m.is_enabled()) else {
            tracing::warn!("Resend API key not configured, skipping email alerts");
            return Ok(summary);
        };

        for site in &sites {
            match self.alert_for_site(site, today).await {
                Ok(Some(notice)) => {
                    let email = notice.render(&self.sender);
                    match mailer.send(&email).await {
                        Ok(()) => {
                            summary.alerts_sent.record(notice.alert_type);
                            tracing::info!(
                                site_id = %site.id,
                                alert_type = %notice.alert_type,
                                "Alert sent"
                            );
                        }
                        Err(e) => tracing::error!(
                            site_id = %site.id,
                            alert_type = %notice.alert_type,
                            error = %e,
                            "Failed to send alert"
                        ),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(site_id = %site.id, error = %e, "Failed to check site for alerts")
                }
            }
        }

        Ok(summary)
    }

    /// The alert this site's owner should get, if any.
    pub async fn alert_for_site(
        &self,
        site: &MonitoredSite,
        today: Date,
    ) -> MonitorResult<Option<AlertNotice>> {
        let Some(owner) = self.store.site_owner(&site.user_id).await? else {
            tracing::warn!(site_id = %site.id, "No user email for site");
            return Ok(None);
        };
        if owner.email.trim().is_empty() {
            tracing::warn!(site_id = %site.id, "No user email for site");
            return Ok(None);
        }

        let rows = self
            .store
            .metrics_since(&site.id, history_start(today))
            .await?;
        let history = HistoricalAverage::trailing_week(&rows, today);

        let snapshot = site.snapshot();
        let uptime = if site.last_sync_status == Some(SyncStatus::Success) {
            UptimeStatus::Up
        } else {
            UptimeStatus::Down
        };
        let day = DayMetrics {
            revenue: snapshot.as_ref().map(|s| s.revenue_today).unwrap_or(0),
            visitors: snapshot.as_ref().map(|s| s.visitors_today).unwrap_or(0),
            uptime,
        };

        let Some(alert) = detect_anomaly(&day, &history).alert else {
            return Ok(None);
        };

        Ok(Some(AlertNotice {
            user_email: owner.email,
            user_name: Some(owner.name).filter(|n| !n.trim().is_empty()),
            site_name: site.name.clone(),
            site_url: site_url(site),
            alert_type: alert.alert_type,
            details: AlertDetails {
                last_checked: site.last_sync_at.map(|t| t.to_string()),
                error_message: site.last_sync_error.clone(),
                avg_revenue_7d: history.avg_revenue_7d,
                today_visitors: day.visitors,
                avg_visitors_7d: history.avg_visitors_7d,
                drop_percentage: alert.drop_percentage,
            },
        }))
    }
}

pub fn site_url(site: &MonitoredSite) -> String {
    if site.url.is_empty() {
        format!("https://{}", site.domain)
    } else {
        site.url.clone()
    }
}
