use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::{ItemOutcome, batch_limit, parse_payload, run_batch};
use crate::config::TaskSettings;
use crate::delivery::AgentEventSink;
use crate::error::AppResult;
use crate::jobs::models::Job;
use crate::jobs::types::{JobHandler, JobType};
use crate::lock::Lease;
use crate::models::AgentEvent;
use crate::store::AgentEventStore;

#[derive(Debug, Default, Deserialize)]
struct AgentEventsPayload {
    #[serde(default)]
    agent_id: Option<Uuid>,
}

/// Drains pending agent events of the job's workspace
pub struct AgentEventProcessor {
    events: Arc<dyn AgentEventStore>,
    sink: Arc<dyn AgentEventSink>,
    settings: TaskSettings,
}

impl AgentEventProcessor {
    pub fn new(
        events: Arc<dyn AgentEventStore>,
        sink: Arc<dyn AgentEventSink>,
        settings: TaskSettings,
    ) -> Self {
        Self {
            events,
            sink,
            settings,
        }
    }

    async fn dispatch(&self, event: AgentEvent) -> AppResult<ItemOutcome> {
        let outcome = match self.sink.dispatch(&event).await {
            Ok(()) => self
                .events
                .mark_event_processed(event.id, Timestamp::now())
                .await?
                .then_some(ItemOutcome::Delivered),
            Err(error) => {
                tracing::warn!(event_id = %event.id, error = %error, "Agent event dispatch failed");
                self.events
                    .mark_event_failed(event.id, &error.to_string(), Timestamp::now())
                    .await?
                    .then_some(ItemOutcome::Rejected)
            }
        };
        Ok(outcome.unwrap_or(ItemOutcome::Skipped))
    }
}

#[async_trait]
impl JobHandler for AgentEventProcessor {
    fn job_type(&self) -> JobType {
        JobType::ProcessAgentEvents
    }

    async fn handle(&self, job: &Job, _lease: &Lease) -> AppResult<JsonValue> {
        let payload: AgentEventsPayload = if job.payload.is_null() {
            AgentEventsPayload::default()
        } else {
            parse_payload(job)?
        };

        let events = self
            .events
            .pending_events(
                job.workspace_id,
                payload.agent_id,
                batch_limit(self.settings.batch_size),
            )
            .await?;
        tracing::info!(job_id = %job.id, batch = events.len(), "Dispatching agent events");

        let tally = run_batch(events, self.settings.send_concurrency, |event| self.dispatch(event)).await?;

        Ok(json!({
            "processed": tally.delivered,
            "failed": tally.rejected,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobsConfig;
    use crate::delivery::{DeliveryError, LogEventSink};
    use crate::jobs::JobStatus;
    use crate::models::AgentEventStatus;
    use crate::store::MemoryStore;
    use jiff::SignedDuration;

    /// Rejects events whose type is `explode`
    struct PickySink;

    #[async_trait]
    impl AgentEventSink for PickySink {
        fn name(&self) -> &'static str {
            "picky"
        }

        async fn dispatch(&self, event: &AgentEvent) -> Result<(), DeliveryError> {
            if event.event_type == "explode" {
                return Err(DeliveryError::Rejected {
                    status: 422,
                    message: "unsupported event".to_string(),
                });
            }
            Ok(())
        }
    }

    fn event(workspace_id: Uuid, agent_id: Uuid, event_type: &str, age_secs: i64) -> AgentEvent {
        AgentEvent {
            id: Uuid::new_v4(),
            workspace_id,
            agent_id,
            event_type: event_type.to_string(),
            payload: json!({}),
            status: AgentEventStatus::Pending,
            processed_at: None,
            error_message: None,
            created_at: Timestamp::now() - SignedDuration::from_secs(age_secs),
        }
    }

    fn job(workspace_id: Uuid, payload: JsonValue) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::ProcessAgentEvents,
            workspace_id,
            payload,
            status: JobStatus::Processing,
            created_at: Timestamp::now(),
            started_at: Some(Timestamp::now()),
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    fn lease() -> Lease {
        Lease {
            lock_name: "process-agent-events".to_string(),
            instance_id: Uuid::new_v4().to_string(),
            expires_at: Timestamp::now() + SignedDuration::from_secs(300),
        }
    }

    fn processor(store: &MemoryStore, sink: Arc<dyn AgentEventSink>) -> AgentEventProcessor {
        AgentEventProcessor::new(
            Arc::new(store.clone()),
            sink,
            JobsConfig::default().task_settings(JobType::ProcessAgentEvents),
        )
    }

    #[tokio::test]
    async fn test_marks_events_processed_or_failed() {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        store.insert_agent_event(event(workspace_id, agent_id, "reply_received", 30)).await;
        store.insert_agent_event(event(workspace_id, agent_id, "explode", 20)).await;
        store.insert_agent_event(event(Uuid::new_v4(), agent_id, "reply_received", 10)).await;

        let result = processor(&store, Arc::new(PickySink))
            .handle(&job(workspace_id, json!({})), &lease())
            .await
            .unwrap();

        assert_eq!(result, json!({ "processed": 1, "failed": 1 }));

        let events = store.agent_events().await;
        let failed = events
            .iter()
            .find(|e| e.event_type == "explode")
            .unwrap();
        assert_eq!(failed.status, AgentEventStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("422"));
        assert_eq!(
            events.iter().filter(|e| e.status == AgentEventStatus::Pending).count(),
            1,
            "other workspaces are untouched"
        );
    }

    #[tokio::test]
    async fn test_agent_filter_limits_scope() {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();
        let wanted = Uuid::new_v4();
        store.insert_agent_event(event(workspace_id, wanted, "tick", 5)).await;
        store.insert_agent_event(event(workspace_id, Uuid::new_v4(), "tick", 5)).await;

        let result = processor(&store, Arc::new(LogEventSink))
            .handle(&job(workspace_id, json!({ "agent_id": wanted })), &lease())
            .await
            .unwrap();

        assert_eq!(result["processed"], 1);
        let processed: Vec<_> = store
            .agent_events()
            .await
            .into_iter()
            .filter(|e| e.status == AgentEventStatus::Processed)
            .collect();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].agent_id, wanted);
        assert!(processed[0].processed_at.is_some());
    }

    #[tokio::test]
    async fn test_null_payload_is_accepted() {
        let store = MemoryStore::new();
        let result = processor(&store, Arc::new(LogEventSink))
            .handle(&job(Uuid::new_v4(), JsonValue::Null), &lease())
            .await
            .unwrap();
        assert_eq!(result["processed"], 0);
    }
}
