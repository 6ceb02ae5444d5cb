//! Configuration management for vera-jobs
//!
//! Layered loading with the following priority (lowest to highest):
//! 1. `default.toml`
//! 2. `{environment}.toml`, selected by `VERA_APP_ENV`
//! 3. `local.toml` (not committed to version control)
//! 4. `VERA_*` environment variables, `__` separating nested keys

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    DatabaseConfig, DeliveryBackend, DeliveryConfig, JobsConfig, ScheduleEntry, SchedulerConfig,
    ServerConfig, Settings, StoreBackend, TaskOverrides, TaskSettings, TriggerConfig,
};
