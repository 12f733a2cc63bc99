use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REFRESH_LOCK_TTL_MS,
    DEFAULT_REFRESH_LOCK_WAIT_MS,
};

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// applies to every HTTP call and every cache round-trip
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub refresh_lock: RefreshLockConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    /// will be mutiply by 2 on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// max delay for retrying
    /// invariant: >= base_delay_ms.
    pub max_delay_ms: Option<u64>,
}

/// Backend-level lock guarding a refresh for one account.
#[derive(Debug, Deserialize, Clone)]
pub struct RefreshLockConfig {
    /// lock expiry; validated to outlive a full refresh including retries
    #[serde(default = "default_refresh_lock_ttl_ms")]
    pub ttl_ms: u64,
    /// how long a loser waits for the winner's token
    #[serde(default = "default_refresh_lock_wait_ms")]
    pub wait_ms: u64,
}

impl Default for RefreshLockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_REFRESH_LOCK_TTL_MS,
            wait_ms: DEFAULT_REFRESH_LOCK_WAIT_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_owned(), port: "9100".to_owned() }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new (level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_refresh_lock_ttl_ms() -> u64 {
    DEFAULT_REFRESH_LOCK_TTL_MS
}

fn default_refresh_lock_wait_ms() -> u64 {
    DEFAULT_REFRESH_LOCK_WAIT_MS
}
