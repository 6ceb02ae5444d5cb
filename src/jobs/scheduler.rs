use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler as TokioCronScheduler};

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::runner::TaskRunner;
use crate::jobs::types::JobType;

/// In-process cron driving `TaskRunner::run`
///
/// Each tick behaves exactly like an external `POST /trigger/{task}`: the
/// distributed lock still decides which instance does the work.
pub struct TaskScheduler {
    scheduler: Mutex<TokioCronScheduler>,
    entries: usize,
}

impl TaskScheduler {
    pub async fn new(runner: TaskRunner, config: &SchedulerConfig) -> AppResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        for entry in &config.entries {
            let task: JobType = entry.task.parse()?;
            let job = Self::cron_job(runner.clone(), task, &entry.cron)?;
            scheduler.add(job).await.map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;
            tracing::info!(%task, cron = %entry.cron, "Scheduled task");
        }

        Ok(Self {
            scheduler: Mutex::new(scheduler),
            entries: config.entries.len(),
        })
    }

    fn cron_job(runner: TaskRunner, task: JobType, cron: &str) -> AppResult<CronJob> {
        CronJob::new_async(cron, move |_uuid, _lock| {
            let runner = runner.clone();

            Box::pin(async move {
                match runner.run(task).await {
                    Ok(run) => tracing::debug!(
                        %task,
                        lock_acquired = run.lock_acquired,
                        job_id = ?run.job.as_ref().map(|j| j.id),
                        "Scheduled run finished"
                    ),
                    Err(e) => tracing::error!(%task, error = %e, "Scheduled run failed"),
                }
            })
        })
        .map_err(|e| AppError::BadRequest {
            message: format!("Invalid cron expression '{cron}' for task {task}: {e}"),
        })
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobsConfig, ScheduleEntry};
    use crate::delivery::Delivery;
    use crate::jobs::{JobQueue, TaskRegistry};
    use crate::lock::LockManager;
    use crate::store::{MemoryStore, Stores};

    fn runner() -> TaskRunner {
        let stores = Stores::memory(MemoryStore::new());
        let jobs = JobsConfig::default();
        TaskRunner::new(
            LockManager::new(stores.locks.clone()),
            JobQueue::new(stores.jobs.clone()),
            TaskRegistry::with_default_tasks(&stores, &Delivery::log("noreply@vera.local"), &jobs),
            jobs,
        )
    }

    fn config(entries: &[(&str, &str)]) -> SchedulerConfig {
        SchedulerConfig {
            enabled: true,
            entries: entries
                .iter()
                .map(|(task, cron)| ScheduleEntry {
                    task: task.to_string(),
                    cron: cron.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_schedules_every_entry() {
        let scheduler = TaskScheduler::new(
            runner(),
            &config(&[
                ("cold-email-send", "0 */5 * * * *"),
                ("newsletter-send", "0 0 * * * *"),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(scheduler.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_invalid_cron() {
        let result =
            TaskScheduler::new(runner(), &config(&[("cold-email-send", "every five minutes")])).await;
        assert!(matches!(result, Err(AppError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn test_rejects_unknown_task() {
        let result = TaskScheduler::new(runner(), &config(&[("sms-send", "0 * * * * *")])).await;
        assert!(matches!(result, Err(AppError::BadRequest { .. })));
    }
}
