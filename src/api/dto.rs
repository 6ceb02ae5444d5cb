//! Request and response bodies of the HTTP API.

use jiff::Timestamp;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::jobs::{JobStatus, JobType};

/// Standard error response format.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "UNAUTHORIZED")]
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Body of a trigger call that ran to completion
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "success": true,
    "task": "cold-email-send",
    "startedAt": "2025-01-15T09:00:00Z",
    "completedAt": "2025-01-15T09:00:02.113Z",
    "lockAcquired": true,
    "jobId": "7b1e3c1e-8a47-4f9b-9d0c-5c1f0b7d2a11",
    "jobStatus": "completed"
}))]
pub struct TriggerResponse {
    pub success: bool,
    #[schema(value_type = String)]
    pub task: JobType,
    #[schema(value_type = String, format = DateTime)]
    pub started_at: Timestamp,
    #[schema(value_type = String, format = DateTime)]
    pub completed_at: Timestamp,
    /// `false` when another instance was already running the task
    pub lock_acquired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub job_status: Option<JobStatus>,
}

/// Body of a trigger call whose processor failed
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerErrorResponse {
    pub error: String,
    #[schema(value_type = String)]
    pub task: JobType,
    #[schema(value_type = String, format = DateTime)]
    pub started_at: Timestamp,
    #[schema(value_type = String, format = DateTime)]
    pub completed_at: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: Timestamp,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    #[schema(example = "ready")]
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_response_uses_camel_case() {
        let now = Timestamp::from_second(1_736_931_600).unwrap();
        let json = serde_json::to_value(TriggerResponse {
            success: true,
            task: JobType::NewsletterSend,
            started_at: now,
            completed_at: now,
            lock_acquired: false,
            job_id: None,
            job_status: None,
        })
        .unwrap();

        assert_eq!(json["task"], "newsletter-send");
        assert_eq!(json["lockAcquired"], false);
        assert_eq!(json["startedAt"], "2025-01-15T09:00:00Z");
        assert!(json.get("jobId").is_none());
    }
}
