//! One scheduler tick for one task: take the task's lock, drain at most one
//! job, release the lock.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::JobsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::models::Job;
use crate::jobs::queue::JobQueue;
use crate::jobs::registry::TaskRegistry;
use crate::jobs::types::{JobHandler, JobType};
use crate::lock::{Lease, LockManager};

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub task: JobType,
    /// `false` when another instance held the lock; nothing ran
    pub lock_acquired: bool,
    /// The job processed under the lock, if the queue was not empty
    pub job: Option<Job>,
}

#[derive(Clone)]
pub struct TaskRunner {
    locks: LockManager,
    queue: JobQueue,
    registry: Arc<TaskRegistry>,
    jobs: JobsConfig,
}

impl TaskRunner {
    pub fn new(locks: LockManager, queue: JobQueue, registry: TaskRegistry, jobs: JobsConfig) -> Self {
        Self {
            locks,
            queue,
            registry: Arc::new(registry),
            jobs,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Tasks with a registered processor
    pub fn task_types(&self) -> Vec<JobType> {
        self.registry.task_types()
    }

    /// Parse a task name and run it
    pub async fn run_named(&self, task: &str) -> AppResult<TaskRun> {
        let task: JobType = task.parse()?;
        self.run(task).await
    }

    pub async fn run(&self, task: JobType) -> AppResult<TaskRun> {
        let handler = self.registry.get(task)?;
        let settings = self.jobs.task_settings(task);
        let queue = self.queue.clone();
        let locks = self.locks.clone();

        let outcome = self
            .locks
            .with_lock(task.lock_name(), settings.lock_ttl, |lease| async move {
                if settings.verify_lease {
                    let fenced = FencedHandler {
                        inner: handler,
                        locks,
                    };
                    queue.process_next(&fenced, &lease).await
                } else {
                    queue.process_next(handler.as_ref(), &lease).await
                }
            })
            .await?;

        let run = match outcome {
            Some(job) => TaskRun {
                task,
                lock_acquired: true,
                job,
            },
            None => {
                tracing::info!(%task, "Task skipped, lock held by another instance");
                TaskRun {
                    task,
                    lock_acquired: false,
                    job: None,
                }
            }
        };
        Ok(run)
    }
}

/// Re-checks lease ownership after the inner handler returns.
///
/// The lease carries no renewal, so a run that outlives its TTL may overlap
/// a newer holder. Failing the job records that instead of reporting a clean
/// completion.
struct FencedHandler {
    inner: Arc<dyn JobHandler>,
    locks: LockManager,
}

#[async_trait]
impl JobHandler for FencedHandler {
    fn job_type(&self) -> JobType {
        self.inner.job_type()
    }

    async fn handle(&self, job: &Job, lease: &Lease) -> AppResult<JsonValue> {
        let result = self.inner.handle(job, lease).await?;
        if !self.locks.is_held(lease).await? {
            tracing::error!(
                job_id = %job.id,
                lock_name = %lease.lock_name,
                instance_id = %lease.instance_id,
                "Lease lost while the job was running"
            );
            return Err(AppError::LeaseLost {
                lock_name: lease.lock_name.clone(),
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskOverrides;
    use crate::delivery::Delivery;
    use crate::jobs::{JobStatus, NewJob};
    use crate::lock::LockRecord;
    use crate::models::{ColdEmailCampaign, Recipient, RecipientStatus};
    use crate::store::{MemoryStore, Stores};
    use jiff::{SignedDuration, Timestamp};
    use serde_json::json;
    use uuid::Uuid;

    fn runner_with(store: &MemoryStore, registry: TaskRegistry, jobs: JobsConfig) -> TaskRunner {
        let stores = Stores::memory(store.clone());
        TaskRunner::new(
            LockManager::new(stores.locks.clone()),
            JobQueue::new(stores.jobs.clone()),
            registry,
            jobs,
        )
    }

    fn default_runner(store: &MemoryStore) -> TaskRunner {
        let jobs = JobsConfig::default();
        let registry = TaskRegistry::with_default_tasks(
            &Stores::memory(store.clone()),
            &Delivery::log("noreply@vera.local"),
            &jobs,
        );
        runner_with(store, registry, jobs)
    }

    async fn seed_campaign(store: &MemoryStore) -> ColdEmailCampaign {
        let now = Timestamp::now();
        let campaign = ColdEmailCampaign {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            name: "Launch".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            status: "scheduled".to_string(),
            recipient_count: 0,
            sent_count: 0,
            created_at: now,
            updated_at: now,
        };
        store.insert_campaign(campaign.clone()).await;
        for email in ["a@example.com", "b@example.com"] {
            store
                .insert_recipient(Recipient {
                    id: Uuid::new_v4(),
                    campaign_id: campaign.id,
                    email: email.to_string(),
                    status: RecipientStatus::Pending,
                    sent_at: None,
                    error_message: None,
                    created_at: now,
                })
                .await;
        }
        campaign
    }

    #[tokio::test]
    async fn test_run_processes_job_and_releases_lock() {
        let store = MemoryStore::new();
        let runner = default_runner(&store);
        let campaign = seed_campaign(&store).await;
        let queued = runner
            .queue()
            .enqueue(NewJob::new(
                JobType::ColdEmailSend,
                campaign.workspace_id,
                json!({ "campaign_id": campaign.id }),
            ))
            .await
            .unwrap();

        let run = runner.run(JobType::ColdEmailSend).await.unwrap();

        assert!(run.lock_acquired);
        let job = run.job.unwrap();
        assert_eq!(job.id, queued.id);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["sent"], 2);
        assert!(store.lock_row("cold-email-send").is_none());
    }

    #[tokio::test]
    async fn test_run_with_empty_queue_acquires_and_does_nothing() {
        let store = MemoryStore::new();
        let run = default_runner(&store).run(JobType::NewsletterSend).await.unwrap();

        assert!(run.lock_acquired);
        assert!(run.job.is_none());
        assert!(store.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_skips_when_lock_is_held() {
        let store = MemoryStore::new();
        store.seed_lock(LockRecord {
            lock_name: "newsletter-send".to_string(),
            instance_id: "other-instance".to_string(),
            expires_at: Timestamp::now() + SignedDuration::from_secs(300),
        });
        let runner = default_runner(&store);
        let queued = runner
            .queue()
            .enqueue(NewJob::new(JobType::NewsletterSend, Uuid::new_v4(), json!({})))
            .await
            .unwrap();

        let run = runner.run(JobType::NewsletterSend).await.unwrap();

        assert!(!run.lock_acquired);
        assert!(run.job.is_none());
        assert_eq!(runner.queue().get(queued.id).await.unwrap().status, JobStatus::Pending);
        assert_eq!(store.lock_row("newsletter-send").unwrap().instance_id, "other-instance");
    }

    #[tokio::test]
    async fn test_failed_job_surfaces_error_and_releases_lock() {
        let store = MemoryStore::new();
        let runner = default_runner(&store);
        let queued = runner
            .queue()
            .enqueue(NewJob::new(
                JobType::ColdEmailSend,
                Uuid::new_v4(),
                json!({ "campaign_id": Uuid::new_v4() }),
            ))
            .await
            .unwrap();

        let error = runner.run(JobType::ColdEmailSend).await.unwrap_err();

        assert!(matches!(error, AppError::NotFound { .. }));
        assert_eq!(runner.queue().get(queued.id).await.unwrap().status, JobStatus::Failed);
        assert!(store.lock_row("cold-email-send").is_none());
    }

    #[tokio::test]
    async fn test_run_named_rejects_unknown_task() {
        let store = MemoryStore::new();
        let error = default_runner(&store).run_named("sms-send").await.unwrap_err();
        assert!(matches!(error, AppError::BadRequest { .. }));
    }

    /// Simulates another instance taking over the lock mid-run
    struct StealingHandler {
        store: MemoryStore,
    }

    #[async_trait]
    impl JobHandler for StealingHandler {
        fn job_type(&self) -> JobType {
            JobType::ProcessAgentEvents
        }

        async fn handle(&self, _job: &Job, lease: &Lease) -> AppResult<JsonValue> {
            self.store.seed_lock(LockRecord {
                lock_name: lease.lock_name.clone(),
                instance_id: "usurper".to_string(),
                expires_at: Timestamp::now() + SignedDuration::from_secs(300),
            });
            Ok(json!({ "processed": 1 }))
        }
    }

    #[tokio::test]
    async fn test_verify_lease_fails_job_after_takeover() {
        let store = MemoryStore::new();
        let mut jobs = JobsConfig::default();
        jobs.tasks.insert(
            "process-agent-events".to_string(),
            TaskOverrides {
                verify_lease: Some(true),
                ..Default::default()
            },
        );
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(StealingHandler {
            store: store.clone(),
        }));
        let runner = runner_with(&store, registry, jobs);
        let queued = runner
            .queue()
            .enqueue(NewJob::new(JobType::ProcessAgentEvents, Uuid::new_v4(), json!({})))
            .await
            .unwrap();

        let error = runner.run(JobType::ProcessAgentEvents).await.unwrap_err();

        assert!(matches!(error, AppError::LeaseLost { .. }));
        let stored = runner.queue().get(queued.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        // release is scoped to our instance id, so the usurper keeps the lock
        assert_eq!(
            store.lock_row("process-agent-events").unwrap().instance_id,
            "usurper"
        );
    }

    #[tokio::test]
    async fn test_without_verify_lease_takeover_is_not_detected() {
        let store = MemoryStore::new();
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(StealingHandler {
            store: store.clone(),
        }));
        let runner = runner_with(&store, registry, JobsConfig::default());
        runner
            .queue()
            .enqueue(NewJob::new(JobType::ProcessAgentEvents, Uuid::new_v4(), json!({})))
            .await
            .unwrap();

        let run = runner.run(JobType::ProcessAgentEvents).await.unwrap();
        assert_eq!(run.job.unwrap().status, JobStatus::Completed);
    }
}
