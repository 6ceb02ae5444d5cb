//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use crate::config::error::ConfigError;
use crate::config::settings::{
    DatabaseConfig, DeliveryBackend, DeliveryConfig, FileSettings, JobsConfig, LoggerSettings,
    SchedulerConfig, ServerConfig, Settings, StoreBackend,
};
use crate::jobs::JobType;

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl ServerConfig {
    /// Validate server configuration
    ///
    /// # Validation Rules
    /// - Port must be between 1 and 65535
    /// - Request timeout must be greater than 0
    /// - Keep-alive timeout must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535. Please specify a valid port number.",
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }

        if self.keep_alive_timeout == 0 {
            return Err(ConfigError::validation(
                "server.keep_alive_timeout",
                "Keep-alive timeout must be greater than 0 seconds.",
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty and must use a PostgreSQL scheme
    /// - Min connections must be greater than 0 and not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !self.is_valid_database_url() {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }

    fn is_valid_database_url(&self) -> bool {
        ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error
    /// - If file logging is enabled, path must not be empty
    /// - Log format must be one of: full, compact, json
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        self.file.validate()?;

        Ok(())
    }
}

impl JobsConfig {
    /// Validate job settings
    ///
    /// # Validation Rules
    /// - Override keys must name a known task
    /// - Every task needs a non-zero TTL, batch size and concurrency
    /// - The lock TTL of every task must exceed the expected batch duration,
    ///   otherwise a healthy run would lose its lease midway
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.tasks.keys() {
            if key.parse::<JobType>().is_err() {
                return Err(ConfigError::ValidationError {
                    field: format!("jobs.tasks.{key}"),
                    message: format!(
                        "Unknown task '{}'. Valid tasks are: {}",
                        key,
                        JobType::all_names().join(", ")
                    ),
                });
            }
        }

        for job_type in JobType::ALL {
            let task = self.task_settings(job_type);
            let field = |name: &str| format!("jobs.tasks.{}.{name}", job_type.as_str());

            if task.lock_ttl.is_zero() {
                return Err(ConfigError::validation(
                    field("lock_ttl"),
                    "Lock TTL must be greater than 0 seconds.".to_string(),
                ));
            }

            if task.batch_size == 0 {
                return Err(ConfigError::validation(
                    field("batch_size"),
                    "Batch size must be greater than 0.".to_string(),
                ));
            }

            if task.send_concurrency == 0 {
                return Err(ConfigError::validation(
                    field("send_concurrency"),
                    "Send concurrency must be greater than 0.".to_string(),
                ));
            }

            let expected = task.expected_batch_duration();
            if task.lock_ttl <= expected {
                return Err(ConfigError::ValidationError {
                    field: field("lock_ttl"),
                    message: format!(
                        "Lock TTL ({}s) must exceed the expected batch duration ({}s for {} items). \
                         Raise lock_ttl or lower batch_size.",
                        task.lock_ttl.as_secs(),
                        expected.as_secs_f64(),
                        task.batch_size
                    ),
                });
            }
        }

        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate scheduler entries
    ///
    /// Cron syntax itself is checked when the scheduler registers the entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.task.parse::<JobType>().is_err() {
                return Err(ConfigError::ValidationError {
                    field: format!("scheduler.entries[{index}].task"),
                    message: format!(
                        "Unknown task '{}'. Valid tasks are: {}",
                        entry.task,
                        JobType::all_names().join(", ")
                    ),
                });
            }

            if entry.cron.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("scheduler.entries[{index}].cron"),
                    "Cron expression cannot be empty.".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl DeliveryConfig {
    /// Validate delivery configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::validation(
                "delivery.timeout_seconds",
                "Delivery timeout must be greater than 0 seconds.",
            ));
        }

        if self.backend == DeliveryBackend::Webhook
            && !(self.webhook_url.starts_with("http://") || self.webhook_url.starts_with("https://"))
        {
            return Err(ConfigError::validation(
                "delivery.webhook_url",
                "An http(s) webhook URL is required when the webhook delivery backend is selected.",
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// This method validates all sub-configurations and returns the first
    /// validation error encountered. The database section is only checked when
    /// the PostgreSQL store backend is selected, and the trigger secret is
    /// checked by the server at startup since offline commands do not need it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.store.backend == StoreBackend::Postgres {
            self.database.validate()?;
        }
        self.logger.validate()?;
        self.jobs.validate()?;
        self.scheduler.validate()?;
        self.delivery.validate()?;
        Ok(())
    }
}
