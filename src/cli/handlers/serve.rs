//! Serve command handler
//!
//! The long-running path lives in [`crate::server::Server`]; this handler
//! covers `serve --dry-run`.

use crate::config::Settings;
use crate::error::AppResult;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Validate everything the server checks at startup, without binding
    ///
    /// # Errors
    /// - Configuration validation errors
    /// - Missing or weak trigger secret
    pub async fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;
        self.config.trigger.validate()?;

        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", self.config.server.address());
        println!("✓ Store backend: {:?}", self.config.store.backend);
        println!("✓ Delivery backend: {:?}", self.config.delivery.backend);
        if self.config.scheduler.enabled {
            println!(
                "✓ In-process scheduler with {} entr{}",
                self.config.scheduler.entries.len(),
                if self.config.scheduler.entries.len() == 1 { "y" } else { "ies" }
            );
        } else {
            println!("✓ In-process scheduler disabled, expecting external trigger calls");
        }

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Settings {
        let mut config = Settings::default();
        config.database.url = "postgres://localhost/test".to_string();
        config.trigger.secret = "0123456789abcdef0123".to_string();
        config
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run() {
        let handler = ServeCommandHandler::new(create_valid_config());
        assert!(handler.validate_only().await.is_ok());
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run_requires_secret() {
        let mut config = create_valid_config();
        config.trigger.secret = String::new();
        let handler = ServeCommandHandler::new(config);
        assert!(handler.validate_only().await.is_err());
    }

    #[tokio::test]
    async fn test_serve_handler_dry_run_invalid_port() {
        let mut config = create_valid_config();
        config.server.port = 0;
        let handler = ServeCommandHandler::new(config);
        assert!(handler.validate_only().await.is_err());
    }
}
