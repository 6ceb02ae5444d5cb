//! Job queue consumer.
//!
//! `process_next` is only called while the task's lease is held, so at most
//! one consumer per job type is active at a time. The claim is still
//! predicated on `pending` so a job never moves backwards.

use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::models::{Job, JobFilter, NewJob};
use crate::jobs::types::{JobHandler, JobStatus};
use crate::lock::Lease;
use crate::store::JobQueueStore;

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobQueueStore>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobQueueStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, new_job: NewJob) -> AppResult<Job> {
        let job = self.store.insert(&new_job, Timestamp::now()).await?;
        tracing::info!(
            task = %job.job_type,
            job_id = %job.id,
            workspace_id = %job.workspace_id,
            "Job enqueued"
        );
        Ok(job)
    }

    /// Claim and run the oldest pending job for the handler's type.
    ///
    /// Returns `Ok(None)` when the queue is empty; no row is touched in that
    /// case. A handler error marks the job `failed` and is returned to the
    /// caller unchanged.
    pub async fn process_next(&self, handler: &dyn JobHandler, lease: &Lease) -> AppResult<Option<Job>> {
        let task = handler.job_type();

        let Some(job) = self.store.oldest_pending(task).await? else {
            tracing::debug!(%task, "No pending jobs");
            return Ok(None);
        };

        let started_at = Timestamp::now();
        if !self.store.claim(job.id, started_at).await? {
            tracing::warn!(%task, job_id = %job.id, "Job was claimed by another consumer");
            return Ok(None);
        }

        let mut job = Job {
            status: JobStatus::Processing,
            started_at: Some(started_at),
            ..job
        };
        tracing::info!(
            %task,
            job_id = %job.id,
            lock_name = %lease.lock_name,
            instance_id = %lease.instance_id,
            "Job claimed"
        );

        match handler.handle(&job, lease).await {
            Ok(result) => {
                let completed_at = Timestamp::now();
                if !self.store.complete(job.id, &result, completed_at).await? {
                    tracing::warn!(%task, job_id = %job.id, "Job left processing before completion was recorded");
                }
                tracing::info!(%task, job_id = %job.id, %result, "Job completed");

                job.status = JobStatus::Completed;
                job.completed_at = Some(completed_at);
                job.result = Some(result);
                Ok(Some(job))
            }
            Err(error) => {
                let message = error.to_string();
                match self.store.fail(job.id, &message, Timestamp::now()).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(%task, job_id = %job.id, "Job left processing before failure was recorded")
                    }
                    Err(store_error) => tracing::error!(
                        %task,
                        job_id = %job.id,
                        error = %store_error,
                        "Failed to record job failure"
                    ),
                }
                tracing::error!(%task, job_id = %job.id, error = %message, "Job failed");
                Err(error)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Job> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Job", "id", id))
    }

    pub async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        self.store.list(filter).await
    }

    /// Enqueue a fresh copy of a failed or stuck `processing` job.
    ///
    /// The original row keeps its terminal or processing state.
    pub async fn requeue(&self, id: Uuid) -> AppResult<Job> {
        let original = self.get(id).await?;
        if !matches!(original.status, JobStatus::Failed | JobStatus::Processing) {
            return Err(AppError::validation(
                "status",
                format!(
                    "Only failed or processing jobs can be requeued; job {id} is {}",
                    original.status
                ),
            ));
        }

        let job = self
            .enqueue(NewJob::new(
                original.job_type,
                original.workspace_id,
                original.payload,
            ))
            .await?;
        tracing::info!(task = %job.job_type, job_id = %job.id, requeued_from = %id, "Job requeued");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobType;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use jiff::SignedDuration;
    use serde_json::{Value as JsonValue, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoHandler {
        job_type: JobType,
        calls: AtomicUsize,
        fail_with: Option<&'static str>,
    }

    impl EchoHandler {
        fn ok(job_type: JobType) -> Self {
            Self {
                job_type,
                calls: AtomicUsize::new(0),
                fail_with: None,
            }
        }

        fn failing(job_type: JobType, message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::ok(job_type)
            }
        }
    }

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> JobType {
            self.job_type
        }

        async fn handle(&self, job: &Job, _lease: &Lease) -> AppResult<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(job.status, JobStatus::Processing);
            match self.fail_with {
                Some(message) => Err(AppError::not_found("Campaign", "id", message)),
                None => Ok(json!({ "sent": 3 })),
            }
        }
    }

    fn lease(job_type: JobType) -> Lease {
        Lease {
            lock_name: job_type.lock_name().to_string(),
            instance_id: Uuid::new_v4().to_string(),
            expires_at: Timestamp::now() + SignedDuration::from_secs(300),
        }
    }

    fn queue(store: &MemoryStore) -> JobQueue {
        JobQueue::new(Arc::new(store.clone()))
    }

    async fn seed(store: &MemoryStore, job_type: JobType, age_secs: i64) -> Job {
        JobQueueStore::insert(
            store,
            &NewJob::new(job_type, Uuid::new_v4(), json!({})),
            Timestamp::now() - SignedDuration::from_secs(age_secs),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_queue_is_noop() {
        let store = MemoryStore::new();
        seed(&store, JobType::NewsletterSend, 10).await;
        let handler = EchoHandler::ok(JobType::ColdEmailSend);

        let processed = queue(&store)
            .process_next(&handler, &lease(JobType::ColdEmailSend))
            .await
            .unwrap();

        assert!(processed.is_none());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(store.jobs().await.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[tokio::test]
    async fn test_claims_only_the_oldest_pending_job() {
        let store = MemoryStore::new();
        let newer = seed(&store, JobType::ColdEmailSend, 10).await;
        let oldest = seed(&store, JobType::ColdEmailSend, 60).await;
        let middle = seed(&store, JobType::ColdEmailSend, 30).await;
        let handler = EchoHandler::ok(JobType::ColdEmailSend);

        let processed = queue(&store)
            .process_next(&handler, &lease(JobType::ColdEmailSend))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(processed.id, oldest.id);
        assert_eq!(processed.status, JobStatus::Completed);
        assert_eq!(processed.result, Some(json!({ "sent": 3 })));

        let q = queue(&store);
        assert_eq!(q.get(oldest.id).await.unwrap().status, JobStatus::Completed);
        assert_eq!(q.get(middle.id).await.unwrap().status, JobStatus::Pending);
        assert_eq!(q.get(newer.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_handler_error_marks_job_failed_and_propagates() {
        let store = MemoryStore::new();
        let job = seed(&store, JobType::NewsletterSend, 5).await;
        let handler = EchoHandler::failing(JobType::NewsletterSend, "missing-issue");

        let error = queue(&store)
            .process_next(&handler, &lease(JobType::NewsletterSend))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound { .. }));

        let stored = queue(&store).get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error_message.unwrap().contains("missing-issue"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_requeue_copies_failed_job() {
        let store = MemoryStore::new();
        let job = seed(&store, JobType::NewsletterSend, 5).await;
        let q = queue(&store);
        let _ = q
            .process_next(
                &EchoHandler::failing(JobType::NewsletterSend, "boom"),
                &lease(JobType::NewsletterSend),
            )
            .await;

        let copy = q.requeue(job.id).await.unwrap();

        assert_ne!(copy.id, job.id);
        assert_eq!(copy.status, JobStatus::Pending);
        assert_eq!(copy.workspace_id, job.workspace_id);
        assert_eq!(q.get(job.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_requeue_rejects_pending_job() {
        let store = MemoryStore::new();
        let job = seed(&store, JobType::ColdEmailSend, 5).await;

        let error = queue(&store).requeue(job.id).await.unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_get_unknown_job_is_not_found() {
        let store = MemoryStore::new();
        let error = queue(&store).get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound { .. }));
    }
}
