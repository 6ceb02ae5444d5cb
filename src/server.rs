//! Server module for managing the worker service lifecycle
//!
//! Handles store initialization, optional in-process scheduling, the HTTP
//! listener and graceful shutdown.

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::api::create_router;
use crate::config::{Environment, Settings};
use crate::jobs::TaskScheduler;
use crate::state::AppState;
use crate::store::Stores;

/// HTTP server manager
pub struct Server {
    settings: Settings,
}

impl Server {
    /// Create a new server with the given settings
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the server and run until a shutdown signal arrives
    ///
    /// # Errors
    /// - Missing or weak trigger secret
    /// - Store initialization errors
    /// - Invalid scheduler entries
    /// - Address binding errors
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            app_name = %self.settings.application.name,
            app_version = %self.settings.application.version,
            environment = %Environment::from_env().as_str(),
            "Application starting"
        );

        tracing::info!(
            host = %self.settings.server.host,
            port = %self.settings.server.port,
            store = ?self.settings.store.backend,
            delivery = ?self.settings.delivery.backend,
            "Server configuration loaded"
        );

        self.settings.trigger.validate().map_err(|e| {
            tracing::error!(error = %e, "Trigger configuration validation failed");
            anyhow::anyhow!("Trigger configuration validation failed: {}", e)
        })?;

        let stores = Stores::from_settings(&self.settings).await?;
        let state = AppState::new(&self.settings, stores)?;
        tracing::info!(
            tasks = ?state.runner.task_types(),
            "Application state created"
        );

        let scheduler = if self.settings.scheduler.enabled {
            let scheduler = TaskScheduler::new(state.runner.clone(), &self.settings.scheduler).await?;
            scheduler.start().await?;
            tracing::info!(entries = scheduler.len(), "In-process scheduler started");
            Some(scheduler)
        } else {
            None
        };

        let router = create_router(state);

        let address = self.settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;

        tracing::info!(address = %address, "Server listening");

        let shutdown = CancellationToken::new();
        tokio::spawn(watch_signals(shutdown.clone()));

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        if let Some(scheduler) = scheduler {
            if let Err(e) = scheduler.shutdown().await {
                tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
            }
        }

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

/// Cancels `token` on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and treated as never firing.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    token.cancel();
}
