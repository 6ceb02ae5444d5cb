use std::collections::HashMap;
use std::sync::Arc;

use crate::config::JobsConfig;
use crate::delivery::Delivery;
use crate::error::{AppError, AppResult};
use crate::jobs::tasks::{AgentEventProcessor, ColdEmailProcessor, NewsletterProcessor};
use crate::jobs::types::{JobHandler, JobType};
use crate::store::Stores;

/// Static mapping from task name to its processor
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in processor for every job type
    pub fn with_default_tasks(stores: &Stores, delivery: &Delivery, jobs: &JobsConfig) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(ColdEmailProcessor::new(
                Arc::clone(&stores.campaigns),
                delivery.clone(),
                jobs.task_settings(JobType::ColdEmailSend),
            )))
            .register(Arc::new(NewsletterProcessor::new(
                Arc::clone(&stores.newsletters),
                delivery.clone(),
                jobs.task_settings(JobType::NewsletterSend),
            )))
            .register(Arc::new(AgentEventProcessor::new(
                Arc::clone(&stores.agent_events),
                Arc::clone(&delivery.events),
                jobs.task_settings(JobType::ProcessAgentEvents),
            )));
        registry
    }

    /// Register a handler under its own job type, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn get(&self, job_type: JobType) -> AppResult<Arc<dyn JobHandler>> {
        self.handlers
            .get(&job_type)
            .cloned()
            .ok_or_else(|| AppError::not_found("JobHandler", "task", job_type))
    }

    pub fn task_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}
