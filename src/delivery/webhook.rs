//! Relay-backed delivery.
//!
//! Both sinks POST a JSON envelope `{kind, data}` to `delivery.webhook_url`.
//! Any non-2xx response is a per-item failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{AgentEventSink, DeliveryError, DeliveryReceipt, Mailer, OutgoingEmail};
use crate::config::DeliveryConfig;
use crate::error::{AppError, AppResult};
use crate::models::AgentEvent;

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    kind: &'static str,
    data: &'a T,
}

#[derive(Debug, Clone)]
struct Relay {
    client: Client,
    url: Url,
}

impl Relay {
    fn new(config: &DeliveryConfig) -> AppResult<Self> {
        let url = Url::parse(&config.webhook_url).map_err(|_| {
            AppError::validation("delivery.webhook_url", "Invalid URL format")
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(10)))
            .pool_max_idle_per_host(10)
            .gzip(true)
            .user_agent(concat!("vera-jobs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        Ok(Self { client, url })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        kind: &'static str,
        data: &T,
    ) -> Result<Option<JsonValue>, DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&Envelope { kind, data })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<JsonValue>().await.ok())
    }
}

/// Mailer forwarding each email to the relay
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    relay: Relay,
}

impl WebhookMailer {
    pub fn new(config: &DeliveryConfig) -> AppResult<Self> {
        Ok(Self {
            relay: Relay::new(config)?,
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError> {
        let body = self.relay.post("email", email).await?;
        let message_id = body
            .as_ref()
            .and_then(|b| b.get("id"))
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        tracing::debug!(to = %email.to, ?message_id, "Email accepted by relay");

        Ok(DeliveryReceipt {
            backend: self.name(),
            message_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEventSink {
    relay: Relay,
}

impl WebhookEventSink {
    pub fn new(config: &DeliveryConfig) -> AppResult<Self> {
        Ok(Self {
            relay: Relay::new(config)?,
        })
    }
}

#[async_trait]
impl AgentEventSink for WebhookEventSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn dispatch(&self, event: &AgentEvent) -> Result<(), DeliveryError> {
        self.relay.post("agent_event", event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryBackend;

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = DeliveryConfig {
            backend: DeliveryBackend::Webhook,
            webhook_url: "not a url".to_string(),
            ..Default::default()
        };
        let error = WebhookMailer::new(&config).unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
    }

    #[test]
    fn test_envelope_shape() {
        let data = serde_json::json!({"to": "ada@example.com"});
        let json = serde_json::to_value(Envelope {
            kind: "email",
            data: &data,
        })
        .unwrap();
        assert_eq!(json["kind"], "email");
        assert_eq!(json["data"]["to"], "ada@example.com");
    }
}
