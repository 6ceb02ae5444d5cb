//! Run command handler
//!
//! Executes one task tick from the command line, under the same lock and
//! with the same processors as a trigger call.

use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::{JobType, TaskRun};
use crate::state::AppState;
use crate::store::Stores;

pub struct RunCommandHandler {
    state: AppState,
}

impl RunCommandHandler {
    /// Connect to the configured store and wire the processors
    pub async fn connect(config: &Settings) -> AppResult<Self> {
        let stores = Stores::from_settings(config).await?;
        Ok(Self {
            state: AppState::new(config, stores)?,
        })
    }

    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run `task` once and print the outcome as JSON
    pub async fn execute(&self, task: JobType) -> AppResult<TaskRun> {
        let run = self.state.runner.run(task).await?;

        if !run.lock_acquired {
            println!("Task {} is already running on another instance", task);
        }
        println!("{}", serde_json::to_string_pretty(&run)?);

        Ok(run)
    }
}
