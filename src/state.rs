//! Application state shared by the HTTP handlers, the scheduler and the CLI.

use std::sync::Arc;

use crate::config::Settings;
use crate::delivery::Delivery;
use crate::error::AppResult;
use crate::jobs::{JobQueue, TaskRegistry, TaskRunner};
use crate::lock::LockManager;
use crate::store::Stores;

/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub runner: TaskRunner,
    pub stores: Stores,
    /// Expected `x-cron-secret` value
    pub trigger_secret: Arc<str>,
}

impl AppState {
    /// Wire the lock manager, queue, delivery backends and processors over
    /// the given stores.
    pub fn new(settings: &Settings, stores: Stores) -> AppResult<Self> {
        let delivery = Delivery::from_settings(&settings.delivery)?;
        let registry = TaskRegistry::with_default_tasks(&stores, &delivery, &settings.jobs);
        let runner = TaskRunner::new(
            LockManager::new(Arc::clone(&stores.locks)),
            JobQueue::new(Arc::clone(&stores.jobs)),
            registry,
            settings.jobs.clone(),
        );

        Ok(Self {
            runner,
            stores,
            trigger_secret: Arc::from(settings.trigger.secret.as_str()),
        })
    }
}
