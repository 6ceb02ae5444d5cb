//! Configuration settings structures for vera-jobs
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;
use crate::jobs::JobType;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "vera-jobs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_keep_alive_timeout() -> u64 {
    75
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/vera-jobs.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_lock_ttl() -> u64 {
    300
}

fn default_batch_size() -> usize {
    500
}

fn default_expected_item_latency_ms() -> u64 {
    200
}

fn default_send_concurrency() -> usize {
    1
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_from_address() -> String {
    "no-reply@localhost".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Axum HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Keep-alive timeout in seconds
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u64,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            keep_alive_timeout: default_keep_alive_timeout(),
        }
    }
}

// ============================================================================
// Database / Store Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

/// Which implementation backs the lock, queue and domain stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared PostgreSQL database (the only backend safe across processes)
    #[default]
    Postgres,
    /// Process-local in-memory tables
    Memory,
}

/// Store selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

// ============================================================================
// Trigger Configuration
// ============================================================================

/// Shared-secret authentication for scheduler-originated trigger calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    /// Expected value of the `x-cron-secret` header.
    /// Supply it through `VERA_TRIGGER__SECRET` rather than a committed file.
    #[serde(default)]
    pub secret: String,
}

impl TriggerConfig {
    /// Minimum accepted secret length
    pub const MIN_SECRET_LEN: usize = 16;

    /// Validates the trigger configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::validation(
                "trigger.secret",
                "Trigger secret cannot be empty",
            ));
        }

        if self.secret.len() < Self::MIN_SECRET_LEN {
            return Err(ConfigError::ValidationError {
                field: "trigger.secret".to_string(),
                message: format!(
                    "Trigger secret should be at least {} characters",
                    Self::MIN_SECRET_LEN
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Whether console output is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether to use colored output
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            colored: default_true(),
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Whether file output is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Whether to append to existing file
    #[serde(default = "default_true")]
    pub append: bool,

    /// Log format: "full", "compact", or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: default_true(),
            format: default_log_format(),
        }
    }
}

/// Logger configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console output settings
    #[serde(default)]
    pub console: ConsoleSettings,

    /// File output settings
    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert LoggerSettings to the runtime LoggerConfig
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let format = self
            .file
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::validation("logger.file.format".to_string(), e.to_string()))?;

        let console = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file = FileConfig::new(
            self.file.enabled,
            PathBuf::from(self.file.path),
            self.file.append,
            format,
        );

        LoggerConfig::new(console, file, self.level)
            .map_err(|e| ConfigError::validation("logger".to_string(), e.to_string()))
    }
}

// ============================================================================
// Jobs Configuration
// ============================================================================

/// Per-task overrides of the job defaults, keyed by task name in `[jobs.tasks]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_item_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_lease: Option<bool>,
}

/// Job processing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Lease duration of a task lock in seconds
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl: u64,

    /// Maximum number of recipients/events handled by one job run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Expected wall-clock cost of one item, used to validate `lock_ttl`
    #[serde(default = "default_expected_item_latency_ms")]
    pub expected_item_latency_ms: u64,

    /// Number of items delivered concurrently inside one batch
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// Re-check lock ownership before committing a job's terminal state
    #[serde(default)]
    pub verify_lease: bool,

    /// Overrides keyed by task name (e.g. `cold-email-send`)
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskOverrides>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            lock_ttl: default_lock_ttl(),
            batch_size: default_batch_size(),
            expected_item_latency_ms: default_expected_item_latency_ms(),
            send_concurrency: default_send_concurrency(),
            verify_lease: false,
            tasks: BTreeMap::new(),
        }
    }
}

/// Effective settings of one task after applying its overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    pub lock_ttl: Duration,
    pub batch_size: usize,
    pub expected_item_latency: Duration,
    pub send_concurrency: usize,
    pub verify_lease: bool,
}

impl TaskSettings {
    /// Expected duration of a full batch given the configured concurrency
    pub fn expected_batch_duration(&self) -> Duration {
        let concurrency = u32::try_from(self.send_concurrency.max(1)).unwrap_or(u32::MAX);
        let items = u32::try_from(self.batch_size).unwrap_or(u32::MAX);
        self.expected_item_latency.saturating_mul(items) / concurrency
    }
}

impl JobsConfig {
    /// Resolve the effective settings of a task
    pub fn task_settings(&self, job_type: JobType) -> TaskSettings {
        let overrides = self.tasks.get(job_type.as_str());
        let pick = |f: fn(&TaskOverrides) -> Option<u64>, default: u64| {
            overrides.and_then(f).unwrap_or(default)
        };

        TaskSettings {
            lock_ttl: Duration::from_secs(pick(|o| o.lock_ttl, self.lock_ttl)),
            batch_size: overrides
                .and_then(|o| o.batch_size)
                .unwrap_or(self.batch_size),
            expected_item_latency: Duration::from_millis(pick(
                |o| o.expected_item_latency_ms,
                self.expected_item_latency_ms,
            )),
            send_concurrency: overrides
                .and_then(|o| o.send_concurrency)
                .unwrap_or(self.send_concurrency),
            verify_lease: overrides
                .and_then(|o| o.verify_lease)
                .unwrap_or(self.verify_lease),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// One in-process cron entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Task name, same vocabulary as `POST /trigger/{task}`
    pub task: String,
    /// Six-field cron expression (seconds first)
    pub cron: String,
}

/// In-process scheduler for deployments without an external cron
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub entries: Vec<ScheduleEntry>,
}

// ============================================================================
// Delivery Configuration
// ============================================================================

/// Delivery backend for outbound email and agent events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryBackend {
    /// Record deliveries in the log only
    #[default]
    Log,
    /// POST each delivery to an HTTP relay
    Webhook,
}

/// Delivery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub backend: DeliveryBackend,

    /// Relay endpoint used by the webhook backend
    #[serde(default)]
    pub webhook_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_delivery_timeout")]
    pub timeout_seconds: u64,

    /// Sender address placed on outgoing email
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backend: DeliveryBackend::default(),
            webhook_url: String::new(),
            timeout_seconds: default_delivery_timeout(),
            from_address: default_from_address(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application information
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Store backend selection
    #[serde(default)]
    pub store: StoreConfig,

    /// Trigger endpoint authentication
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Job processing configuration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// In-process scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,
}
