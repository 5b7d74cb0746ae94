// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! SoloBoard Site Monitoring
//!
//! - **Sync**: probe every active site, record uptime and the cached snapshot
//! - **Alerts**: downtime, missing sales and traffic drops emailed via Resend
//! - **Sites**: plan-limited creation, listing, visitor tracking
//! - **Revenue**: attribute a user's own Creem store sales to a site
//! - **Dashboard**: per-site health against the trailing week

pub mod alerts;
pub mod anomaly;
pub mod dashboard;
pub mod error;
pub mod memory;
pub mod probe;
pub mod revenue;
pub mod sites;
pub mod store;
pub mod sync;

pub use alerts::{AlertDetails, AlertNotice, Email, EmailConfig, Mailer, ResendMailer};
pub use anomaly::{detect_anomaly, Alert, AlertType, Anomaly, DayMetrics, HistoricalAverage, SiteHealth};
pub use dashboard::{Dashboard, DashboardService, DashboardSite, DashboardSummary};
pub use error::{MonitorError, MonitorResult};
pub use memory::InMemorySiteStore;
pub use probe::{ProbeResult, UptimeProbe, DEFAULT_PROBE_TIMEOUT};
pub use revenue::{AttributedSale, RevenueAttributor, StoreSale};
pub use sites::{AddSiteRequest, AddedSite, HealthStatus, SiteListing, SiteService, SiteView};
pub use store::{PgSiteStore, SiteOwner, SiteStore, SyncRecord};
pub use sync::{AlertCounts, AlertSummary, MonitorService, SiteSyncResult, SyncRun, SyncSummary};
