//! Alert emails
//!
//! [`Mailer`] abstracts delivery; [`ResendMailer`] posts to the Resend API.
//! Rendering lives in [`AlertNotice::render`] so tests can assert on the
//! subject without a network round trip.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::anomaly::AlertType;
use crate::error::{MonitorError, MonitorResult};

pub const RESEND_API_BASE: &str = "https://api.resend.com";
pub const DEFAULT_SENDER: &str = "SoloBoard Alerts <alerts@soloboard.com>";

/// A rendered email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> MonitorResult<()>;

    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub sender: String,
    /// Overrides the Resend base URL (tests).
    pub api_base: String,
}

impl EmailConfig {
    /// `RESEND_API_KEY` and `RESEND_SENDER_EMAIL`. A missing key disables
    /// sending.
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let sender = std::env::var("RESEND_SENDER_EMAIL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SENDER.to_string());
        Self {
            api_key,
            sender,
            api_base: RESEND_API_BASE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    config: EmailConfig,
}

impl ResendMailer {
    pub fn new(config: EmailConfig) -> MonitorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MonitorError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn sender(&self) -> &str {
        &self.config.sender
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &Email) -> MonitorResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(MonitorError::EmailNotConfigured)?;

        let response = self
            .http
            .post(format!("{}/emails", self.config.api_base.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Email(format!("{}: {}", status, body)));
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }
}

/// Numbers quoted in the email body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertDetails {
    pub last_checked: Option<String>,
    pub error_message: Option<String>,
    /// Cents per day
    pub avg_revenue_7d: f64,
    pub today_visitors: i64,
    pub avg_visitors_7d: f64,
    pub drop_percentage: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertNotice {
    pub user_email: String,
    pub user_name: Option<String>,
    pub site_name: String,
    pub site_url: String,
    pub alert_type: AlertType,
    pub details: AlertDetails,
}

impl AlertNotice {
    pub fn subject(&self) -> String {
        match self.alert_type {
            AlertType::SiteDown => format!("🚨 {} is DOWN!", self.site_name),
            AlertType::NoSales => format!("⚠️ No sales today on {}", self.site_name),
            AlertType::LowTraffic => format!("📉 Traffic drop detected on {}", self.site_name),
        }
    }

    pub fn render(&self, from: &str) -> Email {
        let greeting = format!(
            "<p>Hi {},</p>",
            escape(self.user_name.as_deref().filter(|n| !n.is_empty()).unwrap_or("there"))
        );
        let site = format!(
            "<p><strong>Site:</strong> {}</p>",
            escape(&self.site_name)
        );
        let body = match self.alert_type {
            AlertType::SiteDown => {
                let mut lines = vec![
                    "<h1>🚨 Website Down Alert</h1>".to_string(),
                    greeting,
                    "<h2>Your website is offline!</h2>".to_string(),
                    site,
                    format!(
                        "<p><strong>URL:</strong> <a href=\"{0}\">{0}</a></p>",
                        escape(&self.site_url)
                    ),
                    format!(
                        "<p><strong>Last Checked:</strong> {}</p>",
                        escape(self.details.last_checked.as_deref().unwrap_or("Just now"))
                    ),
                ];
                if let Some(err) = &self.details.error_message {
                    lines.push(format!("<p><strong>Error:</strong> {}</p>", escape(err)));
                }
                lines.join("\n")
            }
            AlertType::NoSales => [
                "<h1>⚠️ No Sales Alert</h1>".to_string(),
                greeting,
                "<h2>No sales detected today</h2>".to_string(),
                site,
                format!(
                    "<p><strong>7-day average:</strong> ${:.2}/day</p>",
                    self.details.avg_revenue_7d / 100.0
                ),
            ]
            .join("\n"),
            AlertType::LowTraffic => [
                "<h1>📉 Traffic Drop Alert</h1>".to_string(),
                greeting,
                "<h2>Unusual traffic drop detected</h2>".to_string(),
                site,
                format!(
                    "<p><strong>Today's visitors:</strong> {}</p>",
                    self.details.today_visitors
                ),
                format!(
                    "<p><strong>7-day average:</strong> {}</p>",
                    self.details.avg_visitors_7d.round()
                ),
                format!(
                    "<p><strong>Drop:</strong> {}% below average</p>",
                    self.details.drop_percentage.unwrap_or(0)
                ),
            ]
            .join("\n"),
        };

        Email {
            from: from.to_string(),
            to: vec![self.user_email.clone()],
            subject: self.subject(),
            html: format!(
                "<!DOCTYPE html><html><body>\n{}\n<p><a href=\"{}\">Check Your Site</a></p>\n</body></html>",
                body,
                escape(&self.site_url)
            ),
        }
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
