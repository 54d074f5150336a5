// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for flowdesk-sync.
//!
//! Configuration is loaded once at startup and passed into each job as an
//! explicit value. Jobs never read ambient global state, so tests inject
//! whatever configuration they need.

use std::time::Duration;

use flowdesk_engine_sdk::EngineConfig;

/// Sync daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Database URL for the flowdesk store.
    pub database_url: String,
    /// Base64-encoded 32-byte key for credential encryption.
    pub encryption_key: String,
    /// Automation engine client configuration.
    pub engine: EngineConfig,
    /// Service name under which clients' engine credentials are stored.
    pub engine_service_name: String,
    /// Webhook URL for alert delivery. Alerts are only logged when unset.
    pub alert_webhook_url: Option<String>,
    /// Trailing window for execution reconciliation, in days.
    pub reconcile_window_days: u32,
    /// Success-rate threshold below which a workflow is degraded.
    pub success_threshold: f64,
    /// Whether a recovery above the threshold emits an alert.
    pub emit_recovered: bool,
    /// How often the reconciler runs.
    pub reconcile_interval: Duration,
    /// How often the health monitor runs.
    pub health_interval: Duration,
    /// How often the invoice lifecycle runs.
    pub invoice_interval: Duration,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("FLOWDESK_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("FLOWDESK_DATABASE_URL"))?;

        let encryption_key = std::env::var("FLOWDESK_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("FLOWDESK_ENCRYPTION_KEY"))?;

        let engine = EngineConfig::from_env()
            .map_err(|e| ConfigError::Invalid("engine", e.to_string()))?;

        let engine_service_name = std::env::var("FLOWDESK_ENGINE_SERVICE")
            .unwrap_or_else(|_| "automation-engine".to_string());

        let alert_webhook_url = std::env::var("FLOWDESK_ALERT_WEBHOOK_URL").ok();

        let reconcile_window_days = parse_env("FLOWDESK_RECONCILE_WINDOW_DAYS", 7u32)?;
        if reconcile_window_days == 0 {
            return Err(ConfigError::Invalid(
                "FLOWDESK_RECONCILE_WINDOW_DAYS",
                "must be at least 1".to_string(),
            ));
        }

        let success_threshold = parse_env("FLOWDESK_SUCCESS_THRESHOLD", 0.80f64)?;
        if !(0.0..=1.0).contains(&success_threshold) {
            return Err(ConfigError::Invalid(
                "FLOWDESK_SUCCESS_THRESHOLD",
                "must be between 0.0 and 1.0".to_string(),
            ));
        }

        let emit_recovered = std::env::var("FLOWDESK_EMIT_RECOVERED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let reconcile_interval =
            Duration::from_secs(parse_env("FLOWDESK_RECONCILE_INTERVAL_SECS", 900u64)?);
        let health_interval =
            Duration::from_secs(parse_env("FLOWDESK_HEALTH_INTERVAL_SECS", 3600u64)?);
        let invoice_interval =
            Duration::from_secs(parse_env("FLOWDESK_INVOICE_INTERVAL_SECS", 86_400u64)?);

        Ok(Self {
            database_url,
            encryption_key,
            engine,
            engine_service_name,
            alert_webhook_url,
            reconcile_window_days,
            success_threshold,
            emit_recovered,
            reconcile_interval,
            health_interval,
            invoice_interval,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A value could not be parsed or is out of range.
    #[error("Invalid {0}: {1}")]
    Invalid(&'static str, String),
}
