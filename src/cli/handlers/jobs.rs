//! Job queue commands: `enqueue`, `jobs` and `requeue`

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::{Job, JobFilter, JobQueue, JobStatus, JobType, NewJob};
use crate::store::Stores;

pub struct JobsCommandHandler {
    queue: JobQueue,
}

impl JobsCommandHandler {
    pub async fn connect(config: &Settings) -> AppResult<Self> {
        let stores = Stores::from_settings(config).await?;
        Ok(Self::new(JobQueue::new(stores.jobs)))
    }

    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    pub async fn enqueue(&self, job_type: JobType, workspace_id: Uuid, payload: JsonValue) -> AppResult<Job> {
        let job = self
            .queue
            .enqueue(NewJob::new(job_type, workspace_id, payload))
            .await?;
        println!("✓ Queued {} job {}", job.job_type, job.id);
        Ok(job)
    }

    pub async fn list(
        &self,
        job_type: Option<JobType>,
        status: Option<JobStatus>,
        limit: i64,
    ) -> AppResult<Vec<Job>> {
        let jobs = self
            .queue
            .list(&JobFilter {
                job_type,
                status,
                limit,
            })
            .await?;

        if jobs.is_empty() {
            println!("No jobs found");
        }
        for job in &jobs {
            println!(
                "{}  {:<20}  {:<10}  created {}{}",
                job.id,
                job.job_type,
                job.status,
                job.created_at,
                job.error_message
                    .as_deref()
                    .map(|e| format!("  error: {e}"))
                    .unwrap_or_default()
            );
        }
        Ok(jobs)
    }

    pub async fn requeue(&self, id: Uuid) -> AppResult<Job> {
        let job = self.queue.requeue(id).await?;
        println!("✓ Requeued {} as {}", id, job.id);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn handler() -> JobsCommandHandler {
        let stores = Stores::memory(MemoryStore::new());
        JobsCommandHandler::new(JobQueue::new(Arc::clone(&stores.jobs)))
    }

    #[tokio::test]
    async fn test_enqueue_then_list() {
        let handler = handler();
        let workspace = Uuid::new_v4();
        handler
            .enqueue(JobType::ColdEmailSend, workspace, json!({ "campaign_id": Uuid::new_v4() }))
            .await
            .unwrap();
        handler
            .enqueue(JobType::NewsletterSend, workspace, json!({}))
            .await
            .unwrap();

        let all = handler.list(None, None, 50).await.unwrap();
        assert_eq!(all.len(), 2);

        let cold = handler
            .list(Some(JobType::ColdEmailSend), Some(JobStatus::Pending), 50)
            .await
            .unwrap();
        assert_eq!(cold.len(), 1);
        assert_eq!(cold[0].workspace_id, workspace);
    }

    #[tokio::test]
    async fn test_requeue_rejects_pending_job() {
        let handler = handler();
        let job = handler
            .enqueue(JobType::ProcessAgentEvents, Uuid::new_v4(), json!({}))
            .await
            .unwrap();

        let err = handler.requeue(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_requeue_unknown_job_is_not_found() {
        let err = handler().requeue(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
