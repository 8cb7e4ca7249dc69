use serde::Deserialize;

use crate::error::{OutreachError, OutreachResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `OUTREACH__` and TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Display name of the youth program, available as the `{program_name}`
    /// template variable in every campaign message.
    #[serde(default = "default_program_name")]
    pub program_name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Settings for the due-instance dispatcher loop and per-recipient dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// How often the dispatcher scans for due instances.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on a single transport send call.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Bound on concurrent per-recipient sends within one instance.
    #[serde(default = "default_max_parallel_sends")]
    pub max_parallel_sends: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            max_parallel_sends: default_max_parallel_sends(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            program_name: default_program_name(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

// Default functions
fn default_program_name() -> String {
    "Youth Program".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_dispatch_timeout_ms() -> u64 {
    5000
}
fn default_max_parallel_sends() -> usize {
    8
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> OutreachResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OUTREACH")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder
            .build()
            .map_err(|e| OutreachError::Config(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| OutreachError::Config(e.to_string()))
    }
}
