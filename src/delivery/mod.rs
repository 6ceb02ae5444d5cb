//! Outbound side effects performed by the task processors.
//!
//! Processors only see the `Mailer` and `AgentEventSink` traits. The log
//! backends emit tracing events and nothing else; the webhook backends POST
//! JSON to a relay that owns the real provider integration.

mod log;
mod webhook;

pub use log::{LogEventSink, LogMailer};
pub use webhook::{WebhookEventSink, WebhookMailer};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{DeliveryBackend, DeliveryConfig};
use crate::error::AppResult;
use crate::models::AgentEvent;

/// One email handed to a `Mailer`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub workspace_id: Uuid,
    /// Recipient or subscriber row this email was generated for
    pub reference_id: Uuid,
}

/// Acknowledgement from a delivery backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub backend: &'static str,
    pub message_id: Option<String>,
}

/// Failure to deliver a single item
///
/// Processors record these against the item and carry on with the batch.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Invalid recipient address '{0}'")]
    InvalidRecipient(String),

    #[error("Relay rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError>;
}

#[async_trait]
pub trait AgentEventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, event: &AgentEvent) -> Result<(), DeliveryError>;
}

/// Delivery collaborators shared by all processors
#[derive(Clone)]
pub struct Delivery {
    pub mailer: Arc<dyn Mailer>,
    pub events: Arc<dyn AgentEventSink>,
    pub from_address: String,
}

impl Delivery {
    pub fn from_settings(config: &DeliveryConfig) -> AppResult<Self> {
        let (mailer, events): (Arc<dyn Mailer>, Arc<dyn AgentEventSink>) = match config.backend {
            DeliveryBackend::Log => (Arc::new(LogMailer), Arc::new(LogEventSink)),
            DeliveryBackend::Webhook => (
                Arc::new(WebhookMailer::new(config)?),
                Arc::new(WebhookEventSink::new(config)?),
            ),
        };
        tracing::info!(
            mailer = mailer.name(),
            event_sink = events.name(),
            "Delivery backends configured"
        );

        Ok(Self {
            mailer,
            events,
            from_address: config.from_address.clone(),
        })
    }

    /// Log-only delivery, the default for local runs
    pub fn log(from_address: impl Into<String>) -> Self {
        Self {
            mailer: Arc::new(LogMailer),
            events: Arc::new(LogEventSink),
            from_address: from_address.into(),
        }
    }
}
