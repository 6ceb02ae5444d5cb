//! Store seams and their backends.
//!
//! PostgreSQL implementations live in `crate::repositories`; the in-memory
//! backend here serves tests and single-process local runs.

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{AgentEventStore, CampaignStore, JobQueueStore, LockStore, NewsletterStore};

use std::sync::Arc;

use crate::config::{Settings, StoreBackend};
use crate::db::{AsyncDbPool, establish_async_connection_pool, run_pending_migrations};
use crate::error::AppResult;
use crate::repositories::Repositories;

/// Every store the worker needs, behind trait objects
///
/// Cloning is cheap; clones share the underlying backend.
#[derive(Clone)]
pub struct Stores {
    pub locks: Arc<dyn LockStore>,
    pub jobs: Arc<dyn JobQueueStore>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub newsletters: Arc<dyn NewsletterStore>,
    pub agent_events: Arc<dyn AgentEventStore>,
}

impl Stores {
    pub fn memory(store: MemoryStore) -> Self {
        Self {
            locks: Arc::new(store.clone()),
            jobs: Arc::new(store.clone()),
            campaigns: Arc::new(store.clone()),
            newsletters: Arc::new(store.clone()),
            agent_events: Arc::new(store),
        }
    }

    pub fn postgres(pool: AsyncDbPool) -> Self {
        let repos = Repositories::new(pool);
        Self {
            locks: Arc::new(repos.locks),
            jobs: Arc::new(repos.jobs),
            campaigns: Arc::new(repos.campaigns),
            newsletters: Arc::new(repos.newsletters),
            agent_events: Arc::new(repos.agent_events),
        }
    }

    /// Build the backend selected by `store.backend`
    ///
    /// For PostgreSQL this opens the pool and, when `database.auto_migrate`
    /// is set, applies pending migrations first.
    pub async fn from_settings(settings: &Settings) -> AppResult<Self> {
        match settings.store.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory store: locks are not shared across processes");
                Ok(Self::memory(MemoryStore::new()))
            }
            StoreBackend::Postgres => {
                if settings.database.auto_migrate {
                    let applied = run_pending_migrations(&settings.database.url).await?;
                    tracing::info!(count = applied.len(), "Applied pending migrations");
                }
                let pool = establish_async_connection_pool(&settings.database).await?;
                tracing::info!(
                    max_connections = settings.database.max_connections,
                    "Database connection pool established"
                );
                Ok(Self::postgres(pool))
            }
        }
    }
}
