//! CLI argument parsing with clap
//!
//! Defines the command-line interface: the long-running `serve` command plus
//! one-shot operator commands for migrations, task runs and the job queue.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use uuid::Uuid;

use crate::build;
use crate::jobs::{JobStatus, JobType};

/// Background job worker for Vera
#[derive(Parser, Debug)]
#[command(name = "vera-jobs")]
#[command(about = "Background job worker for Vera")]
#[command(long_about = "
vera-jobs drains Vera's job queue. An external scheduler calls
POST /trigger/{task} every minute; each call takes the task's distributed
lock, processes the oldest pending job and releases the lock.

EXAMPLES:
    # Start the worker with default configuration
    vera-jobs serve

    # Validate configuration without starting
    vera-jobs serve --dry-run

    # Run one task once, as the scheduler would
    vera-jobs run cold-email-send

    # Queue a newsletter issue for sending
    vera-jobs enqueue --type newsletter-send \\
        --workspace 0b7e5f0e-3f6a-4c1e-9c43-8d8f5a1e2b10 \\
        --payload '{\"newsletter_id\": \"...\", \"issue_id\": \"...\"}'

    # Inspect failed jobs and retry one
    vera-jobs jobs --status failed
    vera-jobs requeue 7b1e3c1e-8a47-4f9b-9d0c-5c1f0b7d2a11

    # Apply pending database migrations
    vera-jobs migrate
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load a single TOML file instead of the layered `config/` directory.
    /// Environment variables still override its values.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Available values: development (dev), production (prod), staging (stage), test
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trigger endpoint and, when enabled, the in-process scheduler
    ///
    /// Examples:
    ///   vera-jobs serve                           # Start with defaults
    ///   vera-jobs serve --host 0.0.0.0 --port 80 # Bind to all interfaces on port 80
    ///   vera-jobs serve --dry-run                 # Validate config without starting
    Serve {
        /// Host address to bind to
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Port number to listen on
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,

        /// Log level override, takes precedence over --verbose/--quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },

    /// Database migration operations
    ///
    /// Examples:
    ///   vera-jobs migrate                    # Apply all pending migrations
    ///   vera-jobs migrate --dry-run          # Show pending migrations without applying
    ///   vera-jobs migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1-100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },

    /// Run one task once under its lock, exactly like a trigger call
    Run {
        /// Task name: cold-email-send, newsletter-send, process-agent-events
        #[arg(value_name = "TASK", value_parser = super::validation::validate_task)]
        task: JobType,
    },

    /// Queue a new pending job
    Enqueue {
        /// Task the job belongs to
        #[arg(long = "type", value_name = "TASK", value_parser = super::validation::validate_task)]
        job_type: JobType,

        /// Owning workspace id
        #[arg(long, value_name = "UUID")]
        workspace: Uuid,

        /// JSON payload handed to the processor
        #[arg(long, value_name = "JSON", default_value = "{}", value_parser = super::validation::validate_json_payload)]
        payload: JsonValue,
    },

    /// List jobs, newest first
    Jobs {
        /// Only jobs of this task
        #[arg(long = "type", value_name = "TASK", value_parser = super::validation::validate_task)]
        job_type: Option<JobType>,

        /// Only jobs in this status
        #[arg(long, value_name = "STATUS", value_parser = super::validation::validate_job_status)]
        status: Option<JobStatus>,

        /// Maximum number of rows (1-1000)
        #[arg(long, default_value_t = 50, value_parser = super::validation::validate_limit)]
        limit: i64,
    },

    /// Queue a fresh copy of a failed or stuck job
    Requeue {
        /// Id of the job to copy
        #[arg(value_name = "JOB_ID")]
        id: Uuid,
    },
}

/// Environment options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "test")]
    Test,
}

/// Log level options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Cli {
    /// `true` when the process should start the long-running server
    pub fn starts_server(&self) -> bool {
        matches!(
            self.command,
            None | Some(Commands::Serve { dry_run: false, .. })
        )
    }

    /// Checks argument combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Serve {
            host: Some(host),
            port: Some(port),
            ..
        }) = &self.command
            && host == "0.0.0.0"
            && *port < 1024
        {
            return Err("Binding to 0.0.0.0 on a privileged port (< 1024) typically requires root privileges".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }

        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error".to_string(),
            LogLevel::Warn => "warn".to_string(),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Trace => "trace".to_string(),
        }
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Production => crate::config::Environment::Production,
            Environment::Staging => crate::config::Environment::Staging,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}
