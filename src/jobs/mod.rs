//! Job queue consumption under per-task distributed locks.

pub mod models;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod tasks;
pub mod types;

pub use models::{Job, JobFilter, NewJob};
pub use queue::JobQueue;
pub use registry::TaskRegistry;
pub use runner::{TaskRun, TaskRunner};
pub use scheduler::TaskScheduler;
pub use types::{JobHandler, JobStatus, JobType, UnknownJobType};
