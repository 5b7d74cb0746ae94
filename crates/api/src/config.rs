//! Configuration management

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Server configuration loaded from the environment.
///
/// Creem and Resend settings are read by their own crates
/// (`CreemConfig::from_env`, `EmailConfig::from_env`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Pooled connection string used for queries
    pub database_url: String,
    /// Direct connection string for migrations (bypasses the pooler)
    pub database_direct_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_address: String,
    /// Public URL of the web app, used for checkout success redirects
    pub app_url: String,
    /// HS256 signing secret for session tokens
    pub auth_secret: String,
    pub jwt_expiry_hours: i64,
    pub cron_secret: Option<String>,
    pub qstash_current_signing_key: Option<String>,
    pub qstash_next_signing_key: Option<String>,
    /// Bearer secret for `/api/admin/*`. Admin routes are closed when unset.
    pub admin_secret: Option<String>,
    pub allowed_origins: Vec<String>,
    pub run_migrations: bool,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    optional(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_expiry_hours: i64 = parsed("JWT_EXPIRY_HOURS", 168)?;
        if jwt_expiry_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_EXPIRY_HOURS",
                value: jwt_expiry_hours.to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_direct_url: optional("DATABASE_DIRECT_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            app_url: optional("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            auth_secret: required("AUTH_SECRET")?,
            jwt_expiry_hours,
            cron_secret: optional("CRON_SECRET"),
            qstash_current_signing_key: optional("QSTASH_CURRENT_SIGNING_KEY"),
            qstash_next_signing_key: optional("QSTASH_NEXT_SIGNING_KEY"),
            admin_secret: optional("ADMIN_SECRET"),
            allowed_origins: optional("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            run_migrations: flag("RUN_MIGRATIONS"),
        })
    }

    /// Connection string migrations should run against.
    pub fn migration_url(&self) -> &str {
        self.database_direct_url
            .as_deref()
            .unwrap_or(&self.database_url)
    }

    /// Configuration for tests: fixed secrets, no external integrations.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/soloboard_test".to_string(),
            database_direct_url: None,
            database_max_connections: 1,
            bind_address: "127.0.0.1:0".to_string(),
            app_url: "http://localhost:3000".to_string(),
            auth_secret: "test-auth-secret-at-least-32-characters".to_string(),
            jwt_expiry_hours: 24,
            cron_secret: Some("test-cron-secret".to_string()),
            qstash_current_signing_key: None,
            qstash_next_signing_key: None,
            admin_secret: Some("test-admin-secret".to_string()),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            run_migrations: false,
        }
    }
}
