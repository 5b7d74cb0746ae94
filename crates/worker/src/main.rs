//! SoloBoard Background Worker
//!
//! Scheduled jobs:
//! - Site sync and alert emails (every 15 minutes)
//! - Payment invariant diagnostics (hourly)
//! - Heartbeat with a database round trip (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use soloboard_billing::{
    BillingStore, DiagnosticQuery, InvariantChecker, PgBillingStore, ViolationSeverity,
};
use soloboard_monitor::{
    EmailConfig, Mailer, MonitorService, PgSiteStore, ResendMailer, SiteStore, UptimeProbe,
    DEFAULT_PROBE_TIMEOUT,
};
use soloboard_shared::{create_pool, ping};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SYNC_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_CONNECTIONS: u32 = 5;

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn build_monitor(site_store: Arc<dyn SiteStore>) -> anyhow::Result<MonitorService> {
    let email = EmailConfig::from_env();
    let sender = email.sender.clone();
    let mailer: Option<Arc<dyn Mailer>> = if email.api_key.is_some() {
        Some(Arc::new(ResendMailer::new(email)?))
    } else {
        warn!("RESEND_API_KEY not set - site sync runs without alert emails");
        None
    };
    let probe = UptimeProbe::new(DEFAULT_PROBE_TIMEOUT)?;
    Ok(MonitorService::new(site_store, probe, mailer, sender))
}

async fn run_sync(monitor: &MonitorService) {
    info!("Running scheduled site sync");
    match tokio::time::timeout(SYNC_TIMEOUT, monitor.run()).await {
        Ok(Ok(run)) => info!(
            total = run.sync.total,
            succeeded = run.sync.succeeded,
            failed = run.sync.failed,
            sites_checked = run.alerts.sites_checked,
            downtime_alerts = run.alerts.alerts_sent.downtime,
            no_sales_alerts = run.alerts.alerts_sent.no_sales,
            traffic_drop_alerts = run.alerts.alerts_sent.traffic_drop,
            "Site sync complete"
        ),
        Ok(Err(e)) => error!(error = %e, "Site sync failed"),
        Err(_) => error!(timeout_secs = SYNC_TIMEOUT.as_secs(), "Site sync timed out"),
    }
}

async fn run_diagnostics(store: &dyn BillingStore) {
    let report = match InvariantChecker::new(store)
        .run(&DiagnosticQuery::default())
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Payment diagnostics failed");
            return;
        }
    };

    if report.healthy {
        info!(
            paid_orders = report.summary.paid_orders,
            active_subscriptions = report.summary.active_subscriptions,
            "Payment diagnostics: no issues"
        );
        return;
    }

    for issue in &report.issues {
        match issue.severity {
            ViolationSeverity::Critical | ViolationSeverity::High => error!(
                kind = ?issue.kind,
                user_id = %issue.user_id,
                order_no = ?issue.order_no,
                "{}",
                issue.message
            ),
            ViolationSeverity::Medium | ViolationSeverity::Low => warn!(
                kind = ?issue.kind,
                user_id = %issue.user_id,
                order_no = ?issue.order_no,
                "{}",
                issue.message
            ),
        }
    }
    warn!(
        issues = report.issues.len(),
        diagnosis = %report.diagnosis,
        "Payment diagnostics found issues"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting SoloBoard Worker v{}", env!("CARGO_PKG_VERSION"));

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url, MAX_CONNECTIONS).await?;
    info!("Database pool created");

    let billing_store: Arc<dyn BillingStore> = Arc::new(PgBillingStore::new(pool.clone()));
    let site_store: Arc<dyn SiteStore> = Arc::new(PgSiteStore::new(pool.clone()));
    let monitor = Arc::new(build_monitor(site_store)?);

    let mut scheduler = JobScheduler::new().await?;

    // Job 1: site sync + alerts. A run still in progress causes the next tick to be skipped.
    let sync_guard = Arc::new(Mutex::new(()));
    let sync_monitor = monitor.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let monitor = sync_monitor.clone();
            let guard = sync_guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    warn!("Previous site sync still running, skipping this tick");
                    return;
                };
                run_sync(&monitor).await;
            })
        })?)
        .await?;
    info!("Scheduled: Site sync and alerts (every 15 minutes)");

    // Job 2: payment invariants
    let diagnostics_store = billing_store.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let store = diagnostics_store.clone();
            Box::pin(async move {
                info!("Running scheduled payment diagnostics");
                run_diagnostics(store.as_ref()).await;
            })
        })?)
        .await?;
    info!("Scheduled: Payment diagnostics (hourly)");

    // Job 3: heartbeat
    let heartbeat_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let pool = heartbeat_pool.clone();
            Box::pin(async move {
                match ping(&pool).await {
                    Ok(()) => info!("Worker heartbeat - database reachable"),
                    Err(e) => error!(error = %e, "Worker heartbeat - database unreachable"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;
    info!("SoloBoard Worker started with 3 scheduled jobs");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received, stopping scheduler");
    scheduler.shutdown().await?;
    pool.close().await;
    info!("Worker stopped");
    Ok(())
}
