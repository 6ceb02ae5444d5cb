use std::str::FromStr;

use async_trait::async_trait;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::{AppError, AppResult};
use crate::jobs::models::Job;
use crate::lock::Lease;

/// Lifecycle state of a queued job
///
/// Transitions only move forward: `pending -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::VeraJobStatus")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown job status '{s}'. Valid values are: pending, processing, completed, failed"),
            )),
        }
    }
}

/// Task name that was not found in the static task mapping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown task '{0}'")]
pub struct UnknownJobType(pub String);

impl From<UnknownJobType> for AppError {
    fn from(error: UnknownJobType) -> Self {
        AppError::BadRequest {
            message: format!(
                "{error}. Valid tasks are: {}",
                JobType::all_names().join(", ")
            ),
        }
    }
}

/// Kinds of background work; each kind is also the name of its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    ColdEmailSend,
    NewsletterSend,
    ProcessAgentEvents,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::ColdEmailSend,
        JobType::NewsletterSend,
        JobType::ProcessAgentEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ColdEmailSend => "cold-email-send",
            JobType::NewsletterSend => "newsletter-send",
            JobType::ProcessAgentEvents => "process-agent-events",
        }
    }

    /// Name of the distributed lock serializing runs of this task
    pub fn lock_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(JobType::as_str).collect()
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = UnknownJobType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownJobType(s.to_string()))
    }
}

/// Task-specific work executed for one claimed job
///
/// Implementations run only while the task's lease is held. The returned
/// value is stored as the job's `result`; an error marks the job failed.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn handle(&self, job: &Job, lease: &Lease) -> AppResult<JsonValue>;
}
