//! PostgreSQL implementations of the store traits.
//!
//! Each repository owns a clone of the async connection pool and maps rows
//! through private row structs into the domain types.

mod agent_event_repo;
mod campaign_repo;
mod job_queue_repo;
mod lock_repo;
mod newsletter_repo;

pub use agent_event_repo::AgentEventRepository;
pub use campaign_repo::CampaignRepository;
pub use job_queue_repo::JobQueueRepository;
pub use lock_repo::LockRepository;
pub use newsletter_repo::NewsletterRepository;

use crate::db::AsyncDbPool;

/// Aggregates all repositories.
///
/// Since `AsyncDbPool` uses `Arc` internally, cloning is cheap.
#[derive(Clone)]
pub struct Repositories {
    pub locks: LockRepository,
    pub jobs: JobQueueRepository,
    pub campaigns: CampaignRepository,
    pub newsletters: NewsletterRepository,
    pub agent_events: AgentEventRepository,
}

impl Repositories {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self {
            locks: LockRepository::new(pool.clone()),
            jobs: JobQueueRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool.clone()),
            newsletters: NewsletterRepository::new(pool.clone()),
            agent_events: AgentEventRepository::new(pool),
        }
    }
}
