use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::jobs::types::{JobStatus, JobType};

/// One row of the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub workspace_id: Uuid,
    pub payload: JsonValue,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
}

/// Job submitted by the web application (or the `enqueue` command)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    pub workspace_id: Uuid,
    #[serde(default = "empty_payload")]
    pub payload: JsonValue,
}

fn empty_payload() -> JsonValue {
    JsonValue::Object(Default::default())
}

impl NewJob {
    pub fn new(job_type: JobType, workspace_id: Uuid, payload: JsonValue) -> Self {
        Self {
            job_type,
            workspace_id,
            payload,
        }
    }
}

/// Operator query over the queue, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub limit: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            job_type: None,
            status: None,
            limit: 50,
        }
    }
}
