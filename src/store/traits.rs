//! Storage seams used by the lock manager, the job queue and the task
//! processors.
//!
//! Every mutating operation is a single atomic row operation: an insert that
//! reports a duplicate key as `false`, or an update/delete whose predicate
//! reports "zero rows affected" as `false`. Implementations must never turn
//! those outcomes into errors.

use async_trait::async_trait;
use jiff::Timestamp;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::AppResult;
use crate::jobs::{Job, JobFilter, JobType, NewJob};
use crate::lock::LockRecord;
use crate::models::{
    AgentEvent, CampaignProgress, ColdEmailCampaign, IssueProgress, NewDelivery, NewsletterIssue,
    Recipient, Subscriber,
};

/// Lock table: one row per lock name
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert a fresh row; `false` when a row for the name already exists.
    async fn insert(&self, record: &LockRecord) -> AppResult<bool>;

    async fn find(&self, lock_name: &str) -> AppResult<Option<LockRecord>>;

    /// Replace owner and expiry only if the current row expired at or before
    /// `now`; `false` when another claimant renewed it first.
    async fn take_over_expired(
        &self,
        lock_name: &str,
        record: &LockRecord,
        now: Timestamp,
    ) -> AppResult<bool>;

    /// Delete the row only if it is still owned by `instance_id`.
    async fn delete_owned(&self, lock_name: &str, instance_id: &str) -> AppResult<bool>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> AppResult<()>;
}

/// Job queue table
#[async_trait]
pub trait JobQueueStore: Send + Sync {
    async fn insert(&self, new_job: &NewJob, created_at: Timestamp) -> AppResult<Job>;

    /// Oldest pending job of the type by `created_at`.
    async fn oldest_pending(&self, job_type: JobType) -> AppResult<Option<Job>>;

    /// `pending -> processing`; `false` if the job is no longer pending.
    async fn claim(&self, id: Uuid, started_at: Timestamp) -> AppResult<bool>;

    /// `processing -> completed`; `false` if the job is not processing.
    async fn complete(&self, id: Uuid, result: &JsonValue, completed_at: Timestamp)
    -> AppResult<bool>;

    /// `processing -> failed`; `false` if the job is not processing.
    async fn fail(&self, id: Uuid, error_message: &str, completed_at: Timestamp)
    -> AppResult<bool>;

    async fn find(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// Jobs matching the filter, newest first.
    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>>;
}

/// Cold email campaigns and their recipients
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn find_campaign(&self, id: Uuid) -> AppResult<Option<ColdEmailCampaign>>;

    /// Up to `limit` pending recipients, oldest first.
    async fn pending_recipients(&self, campaign_id: Uuid, limit: i64) -> AppResult<Vec<Recipient>>;

    /// `pending -> sent`; `false` if the recipient was already advanced.
    async fn mark_recipient_sent(&self, id: Uuid, sent_at: Timestamp) -> AppResult<bool>;

    /// `pending -> bounced`; `false` if the recipient was already advanced.
    async fn mark_recipient_bounced(&self, id: Uuid, error_message: &str) -> AppResult<bool>;

    /// Add `sent` to the campaign's `sent_count`, refresh `recipient_count`
    /// and move the campaign to `sent` once no pending recipient remains.
    async fn record_campaign_progress(
        &self,
        campaign_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<CampaignProgress>;
}

/// Newsletter issues, subscribers and per-issue deliveries
#[async_trait]
pub trait NewsletterStore: Send + Sync {
    async fn find_issue(&self, id: Uuid) -> AppResult<Option<NewsletterIssue>>;

    /// Active subscribers of the newsletter with no delivery row for the
    /// issue, oldest first.
    async fn undelivered_subscribers(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Subscriber>>;

    /// `false` when a delivery for the (issue, subscriber) pair already exists.
    async fn record_delivery(&self, delivery: &NewDelivery) -> AppResult<bool>;

    /// Add `sent` to the issue's `sent_count`, refresh `recipient_count` and
    /// mark the issue `sent` once every active subscriber has a delivery row.
    async fn record_issue_progress(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<IssueProgress>;
}

/// Agent events awaiting dispatch
#[async_trait]
pub trait AgentEventStore: Send + Sync {
    /// Up to `limit` pending events of the workspace (optionally one agent),
    /// oldest first.
    async fn pending_events(
        &self,
        workspace_id: Uuid,
        agent_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<AgentEvent>>;

    async fn mark_event_processed(&self, id: Uuid, processed_at: Timestamp) -> AppResult<bool>;

    async fn mark_event_failed(
        &self,
        id: Uuid,
        error_message: &str,
        processed_at: Timestamp,
    ) -> AppResult<bool>;
}
