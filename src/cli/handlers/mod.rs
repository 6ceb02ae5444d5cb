//! Command handlers for CLI operations

pub mod jobs;
pub mod migrate;
pub mod run;
pub mod serve;

pub use jobs::JobsCommandHandler;
pub use migrate::MigrateCommandHandler;
pub use run::RunCommandHandler;
pub use serve::ServeCommandHandler;
