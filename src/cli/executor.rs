//! Command executor for dispatching one-shot CLI commands
//!
//! `serve` without `--dry-run` is started by `main` through
//! [`crate::server::Server`]; everything else runs here and exits.

use super::handlers::{
    JobsCommandHandler, MigrateCommandHandler, RunCommandHandler, ServeCommandHandler,
};
use super::parser::{Cli, Commands};
use crate::config::Settings;
use crate::error::{AppError, AppResult};

/// Execute a CLI command with the given settings
///
/// # Errors
/// Returns argument validation errors and errors from the command handlers
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    cli.validate().map_err(|reason| AppError::Validation {
        field: "cli_arguments".to_string(),
        reason,
    })?;

    match &cli.command {
        Some(Commands::Serve { dry_run: true, .. }) => {
            ServeCommandHandler::new(settings).validate_only().await
        }
        Some(Commands::Serve { .. }) | None => Ok(()),
        Some(Commands::Migrate { dry_run, rollback }) => {
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
        Some(Commands::Run { task }) => {
            let run = RunCommandHandler::connect(&settings).await?.execute(*task).await?;
            tracing::info!(task = %run.task, lock_acquired = run.lock_acquired, "Run finished");
            Ok(())
        }
        Some(Commands::Enqueue {
            job_type,
            workspace,
            payload,
        }) => {
            JobsCommandHandler::connect(&settings)
                .await?
                .enqueue(*job_type, *workspace, payload.clone())
                .await?;
            Ok(())
        }
        Some(Commands::Jobs {
            job_type,
            status,
            limit,
        }) => {
            JobsCommandHandler::connect(&settings)
                .await?
                .list(*job_type, *status, *limit)
                .await?;
            Ok(())
        }
        Some(Commands::Requeue { id }) => {
            JobsCommandHandler::connect(&settings).await?.requeue(*id).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use clap::Parser;

    fn memory_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/test".to_string();
        config.store.backend = StoreBackend::Memory;
        config.trigger.secret = "0123456789abcdef0123".to_string();
        config
    }

    #[tokio::test]
    async fn test_execute_serve_dry_run() {
        let cli = Cli::try_parse_from(["vera-jobs", "serve", "--dry-run"]).unwrap();
        assert!(execute_command(&cli, memory_config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_run_on_memory_store() {
        let cli = Cli::try_parse_from(["vera-jobs", "run", "cold-email-send"]).unwrap();
        assert!(execute_command(&cli, memory_config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_jobs_on_memory_store() {
        let cli = Cli::try_parse_from(["vera-jobs", "jobs", "--type", "newsletter-send"]).unwrap();
        assert!(execute_command(&cli, memory_config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_rejects_privileged_wildcard_bind() {
        let cli = Cli::try_parse_from(["vera-jobs", "serve", "--host", "0.0.0.0", "--port", "80"])
            .unwrap();
        let err = execute_command(&cli, memory_config()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
