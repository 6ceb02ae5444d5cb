use async_trait::async_trait;
use validator::ValidateEmail;

use super::{AgentEventSink, DeliveryError, DeliveryReceipt, Mailer, OutgoingEmail};
use crate::models::AgentEvent;

/// Mailer that only records the send as a tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError> {
        if !email.to.validate_email() {
            return Err(DeliveryError::InvalidRecipient(email.to.clone()));
        }

        tracing::info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            reference_id = %email.reference_id,
            "Email delivered to log"
        );

        Ok(DeliveryReceipt {
            backend: self.name(),
            message_id: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

#[async_trait]
impl AgentEventSink for LogEventSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(&self, event: &AgentEvent) -> Result<(), DeliveryError> {
        tracing::info!(
            event_id = %event.id,
            agent_id = %event.agent_id,
            event_type = %event.event_type,
            "Agent event dispatched to log"
        );
        Ok(())
    }
}
