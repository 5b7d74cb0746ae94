//! HTTP uptime probe

use std::time::{Duration, Instant};

use soloboard_shared::UptimeStatus;

use crate::error::{MonitorError, MonitorResult};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: UptimeStatus,
    pub response_time_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn is_up(&self) -> bool {
        self.status == UptimeStatus::Up
    }
}

#[derive(Clone)]
pub struct UptimeProbe {
    http: reqwest::Client,
}

impl UptimeProbe {
    pub fn new(timeout: Duration) -> MonitorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("SoloBoard-Monitor/1.0")
            .build()
            .map_err(|e| MonitorError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// GET the url. 2xx and 3xx count as up; anything else, including
    /// timeouts and connection errors, is down.
    pub async fn check(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        match self.http.get(url).send().await {
            Ok(response) => {
                let elapsed = elapsed_ms(started);
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    ProbeResult {
                        status: UptimeStatus::Up,
                        response_time_ms: Some(elapsed),
                        http_status: Some(status.as_u16()),
                        error: None,
                    }
                } else {
                    ProbeResult {
                        status: UptimeStatus::Down,
                        response_time_ms: Some(elapsed),
                        http_status: Some(status.as_u16()),
                        error: Some(format!("HTTP {}", status.as_u16())),
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "Request timed out".to_string()
                } else {
                    e.to_string()
                };
                tracing::debug!(url = %url, error = %error, "Probe failed");
                ProbeResult {
                    status: UptimeStatus::Down,
                    response_time_ms: None,
                    http_status: None,
                    error: Some(error),
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
