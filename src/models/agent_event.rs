use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

text_enum! {
    pub enum AgentEventStatus {
        Pending => "pending",
        Processed => "processed",
        Failed => "failed",
    }
}

/// Event emitted by an automation agent, drained by `process-agent-events`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub agent_id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: AgentEventStatus,
    pub processed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}
