//! Process-local implementation of every store trait.
//!
//! Honors the same atomic contracts as the PostgreSQL repositories: the lock
//! table relies on `DashMap` shard locking for insert-if-absent and
//! predicated update/delete, and each domain table is guarded by one async
//! mutex so a read-modify-write never interleaves with another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jiff::Timestamp;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::{Job, JobFilter, JobStatus, JobType, NewJob};
use crate::lock::LockRecord;
use crate::models::{
    AgentEvent, AgentEventStatus, CampaignProgress, ColdEmailCampaign, IssueProgress, NewDelivery,
    NewsletterIssue, Recipient, RecipientStatus, Subscriber, SubscriberStatus,
};
use crate::store::traits::{
    AgentEventStore, CampaignStore, JobQueueStore, LockStore, NewsletterStore,
};

/// In-memory store; clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Tables>,
}

#[derive(Default)]
struct Tables {
    locks: DashMap<String, LockRecord>,
    jobs: Mutex<Vec<Job>>,
    campaigns: Mutex<CampaignTables>,
    newsletters: Mutex<NewsletterTables>,
    agent_events: Mutex<Vec<AgentEvent>>,
}

#[derive(Default)]
struct CampaignTables {
    campaigns: HashMap<Uuid, ColdEmailCampaign>,
    recipients: Vec<Recipient>,
}

#[derive(Default)]
struct NewsletterTables {
    issues: HashMap<Uuid, NewsletterIssue>,
    subscribers: Vec<Subscriber>,
    deliveries: Vec<NewDelivery>,
}

impl NewsletterTables {
    fn is_delivered(&self, issue_id: Uuid, subscriber_id: Uuid) -> bool {
        self.deliveries
            .iter()
            .any(|d| d.issue_id == issue_id && d.subscriber_id == subscriber_id)
    }

    fn undelivered(&self, issue_id: Uuid, newsletter_id: Uuid) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.iter().filter(move |s| {
            s.newsletter_id == newsletter_id
                && s.status == SubscriberStatus::Active
                && !self.is_delivered(issue_id, s.id)
        })
    }
}

// Rows are kept in insertion order; a stable sort by `created_at` keeps
// insertion order for equal timestamps.
fn oldest_first<T: Clone>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> Timestamp) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| key(row));
    rows
}

fn take(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lock row, if any
    pub fn lock_row(&self, lock_name: &str) -> Option<LockRecord> {
        self.inner.locks.get(lock_name).map(|r| r.value().clone())
    }

    /// Overwrite a lock row unconditionally
    pub fn seed_lock(&self, record: LockRecord) {
        self.inner.locks.insert(record.lock_name.clone(), record);
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.jobs.lock().await.clone()
    }

    pub async fn insert_campaign(&self, campaign: ColdEmailCampaign) {
        self.inner
            .campaigns
            .lock()
            .await
            .campaigns
            .insert(campaign.id, campaign);
    }

    pub async fn insert_recipient(&self, recipient: Recipient) {
        self.inner.campaigns.lock().await.recipients.push(recipient);
    }

    pub async fn recipients(&self, campaign_id: Uuid) -> Vec<Recipient> {
        self.inner
            .campaigns
            .lock()
            .await
            .recipients
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub async fn campaign(&self, id: Uuid) -> Option<ColdEmailCampaign> {
        self.inner.campaigns.lock().await.campaigns.get(&id).cloned()
    }

    pub async fn insert_issue(&self, issue: NewsletterIssue) {
        self.inner
            .newsletters
            .lock()
            .await
            .issues
            .insert(issue.id, issue);
    }

    pub async fn insert_subscriber(&self, subscriber: Subscriber) {
        self.inner
            .newsletters
            .lock()
            .await
            .subscribers
            .push(subscriber);
    }

    pub async fn issue(&self, id: Uuid) -> Option<NewsletterIssue> {
        self.inner.newsletters.lock().await.issues.get(&id).cloned()
    }

    pub async fn deliveries(&self, issue_id: Uuid) -> Vec<NewDelivery> {
        self.inner
            .newsletters
            .lock()
            .await
            .deliveries
            .iter()
            .filter(|d| d.issue_id == issue_id)
            .cloned()
            .collect()
    }

    pub async fn insert_agent_event(&self, event: AgentEvent) {
        self.inner.agent_events.lock().await.push(event);
    }

    pub async fn agent_events(&self) -> Vec<AgentEvent> {
        self.inner.agent_events.lock().await.clone()
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn insert(&self, record: &LockRecord) -> AppResult<bool> {
        match self.inner.locks.entry(record.lock_name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn find(&self, lock_name: &str) -> AppResult<Option<LockRecord>> {
        Ok(self.lock_row(lock_name))
    }

    async fn take_over_expired(
        &self,
        lock_name: &str,
        record: &LockRecord,
        now: Timestamp,
    ) -> AppResult<bool> {
        match self.inner.locks.get_mut(lock_name) {
            Some(mut current) if current.is_expired(now) => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_owned(&self, lock_name: &str, instance_id: &str) -> AppResult<bool> {
        Ok(self
            .inner
            .locks
            .remove_if(lock_name, |_, current| current.instance_id == instance_id)
            .is_some())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl JobQueueStore for MemoryStore {
    async fn insert(&self, new_job: &NewJob, created_at: Timestamp) -> AppResult<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            job_type: new_job.job_type,
            workspace_id: new_job.workspace_id,
            payload: new_job.payload.clone(),
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        };
        self.inner.jobs.lock().await.push(job.clone());
        Ok(job)
    }

    async fn oldest_pending(&self, job_type: JobType) -> AppResult<Option<Job>> {
        let jobs = self.inner.jobs.lock().await;
        Ok(jobs
            .iter()
            .filter(|j| j.job_type == job_type && j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn claim(&self, id: Uuid, started_at: Timestamp) -> AppResult<bool> {
        let mut jobs = self.inner.jobs.lock().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.started_at = Some(started_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        result: &JsonValue,
        completed_at: Timestamp,
    ) -> AppResult<bool> {
        let mut jobs = self.inner.jobs.lock().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            Some(job) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(completed_at);
                job.result = Some(result.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fail(&self, id: Uuid, error_message: &str, completed_at: Timestamp) -> AppResult<bool> {
        let mut jobs = self.inner.jobs.lock().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            Some(job) => {
                job.status = JobStatus::Failed;
                job.completed_at = Some(completed_at);
                job.error_message = Some(error_message.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self
            .inner
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let jobs = self.inner.jobs.lock().await;
        let mut matching: Vec<Job> = jobs
            .iter()
            .rev()
            .filter(|j| filter.job_type.is_none_or(|t| j.job_type == t))
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(take(filter.limit));
        Ok(matching)
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn find_campaign(&self, id: Uuid) -> AppResult<Option<ColdEmailCampaign>> {
        Ok(self.campaign(id).await)
    }

    async fn pending_recipients(&self, campaign_id: Uuid, limit: i64) -> AppResult<Vec<Recipient>> {
        let tables = self.inner.campaigns.lock().await;
        let mut pending = oldest_first(
            tables
                .recipients
                .iter()
                .filter(|r| r.campaign_id == campaign_id && r.status == RecipientStatus::Pending)
                .cloned(),
            |r| r.created_at,
        );
        pending.truncate(take(limit));
        Ok(pending)
    }

    async fn mark_recipient_sent(&self, id: Uuid, sent_at: Timestamp) -> AppResult<bool> {
        let mut tables = self.inner.campaigns.lock().await;
        match tables
            .recipients
            .iter_mut()
            .find(|r| r.id == id && r.status == RecipientStatus::Pending)
        {
            Some(recipient) => {
                recipient.status = RecipientStatus::Sent;
                recipient.sent_at = Some(sent_at);
                recipient.error_message = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_recipient_bounced(&self, id: Uuid, error_message: &str) -> AppResult<bool> {
        let mut tables = self.inner.campaigns.lock().await;
        match tables
            .recipients
            .iter_mut()
            .find(|r| r.id == id && r.status == RecipientStatus::Pending)
        {
            Some(recipient) => {
                recipient.status = RecipientStatus::Bounced;
                recipient.error_message = Some(error_message.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_campaign_progress(
        &self,
        campaign_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<CampaignProgress> {
        let mut tables = self.inner.campaigns.lock().await;
        let (total, pending) = tables
            .recipients
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .fold((0i32, 0i64), |(total, pending), r| {
                (
                    total + 1,
                    pending + i64::from(r.status == RecipientStatus::Pending),
                )
            });

        let campaign = tables
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| AppError::not_found("Campaign", "id", campaign_id))?;
        campaign.sent_count += sent;
        campaign.recipient_count = total;
        campaign.updated_at = now;
        campaign.status = if pending == 0 {
            ColdEmailCampaign::STATUS_SENT
        } else {
            ColdEmailCampaign::STATUS_SENDING
        }
        .to_string();

        Ok(CampaignProgress {
            recipient_count: campaign.recipient_count,
            sent_count: campaign.sent_count,
            pending,
        })
    }
}

#[async_trait]
impl NewsletterStore for MemoryStore {
    async fn find_issue(&self, id: Uuid) -> AppResult<Option<NewsletterIssue>> {
        Ok(self.issue(id).await)
    }

    async fn undelivered_subscribers(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Subscriber>> {
        let tables = self.inner.newsletters.lock().await;
        let mut subscribers = oldest_first(
            tables.undelivered(issue_id, newsletter_id).cloned(),
            |s| s.created_at,
        );
        subscribers.truncate(take(limit));
        Ok(subscribers)
    }

    async fn record_delivery(&self, delivery: &NewDelivery) -> AppResult<bool> {
        let mut tables = self.inner.newsletters.lock().await;
        if tables.is_delivered(delivery.issue_id, delivery.subscriber_id) {
            return Ok(false);
        }
        tables.deliveries.push(delivery.clone());
        Ok(true)
    }

    async fn record_issue_progress(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<IssueProgress> {
        let mut tables = self.inner.newsletters.lock().await;
        let active = tables
            .subscribers
            .iter()
            .filter(|s| s.newsletter_id == newsletter_id && s.status == SubscriberStatus::Active)
            .count();
        let remaining = tables.undelivered(issue_id, newsletter_id).count();

        let issue = tables
            .issues
            .get_mut(&issue_id)
            .ok_or_else(|| AppError::not_found("NewsletterIssue", "id", issue_id))?;
        issue.sent_count += sent;
        issue.recipient_count = i32::try_from(active).unwrap_or(i32::MAX);
        if remaining == 0 {
            issue.status = NewsletterIssue::STATUS_SENT.to_string();
            issue.sent_at = Some(now);
        } else {
            issue.status = NewsletterIssue::STATUS_SENDING.to_string();
        }

        Ok(IssueProgress {
            recipient_count: issue.recipient_count,
            sent_count: issue.sent_count,
            remaining: i64::try_from(remaining).unwrap_or(i64::MAX),
        })
    }
}

#[async_trait]
impl AgentEventStore for MemoryStore {
    async fn pending_events(
        &self,
        workspace_id: Uuid,
        agent_id: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<AgentEvent>> {
        let events = self.inner.agent_events.lock().await;
        let mut pending = oldest_first(
            events
                .iter()
                .filter(|e| {
                    e.workspace_id == workspace_id
                        && e.status == AgentEventStatus::Pending
                        && agent_id.is_none_or(|agent| e.agent_id == agent)
                })
                .cloned(),
            |e| e.created_at,
        );
        pending.truncate(take(limit));
        Ok(pending)
    }

    async fn mark_event_processed(&self, id: Uuid, processed_at: Timestamp) -> AppResult<bool> {
        let mut events = self.inner.agent_events.lock().await;
        match events
            .iter_mut()
            .find(|e| e.id == id && e.status == AgentEventStatus::Pending)
        {
            Some(event) => {
                event.status = AgentEventStatus::Processed;
                event.processed_at = Some(processed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_event_failed(
        &self,
        id: Uuid,
        error_message: &str,
        processed_at: Timestamp,
    ) -> AppResult<bool> {
        let mut events = self.inner.agent_events.lock().await;
        match events
            .iter_mut()
            .find(|e| e.id == id && e.status == AgentEventStatus::Pending)
        {
            Some(event) => {
                event.status = AgentEventStatus::Failed;
                event.processed_at = Some(processed_at);
                event.error_message = Some(error_message.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryStatus;
    use jiff::SignedDuration;
    use proptest::prelude::*;
    use serde_json::json;

    fn at(seconds: i64) -> Timestamp {
        Timestamp::from_second(1_700_000_000 + seconds).unwrap()
    }

    fn new_job(job_type: JobType) -> NewJob {
        NewJob::new(job_type, Uuid::new_v4(), json!({}))
    }

    #[tokio::test]
    async fn lock_insert_conflicts_even_when_expired() {
        let store = MemoryStore::new();
        let record = LockRecord {
            lock_name: "cold-email-send".to_string(),
            instance_id: "a".to_string(),
            expires_at: at(0),
        };
        assert!(LockStore::insert(&store, &record).await.unwrap());

        let second = LockRecord {
            instance_id: "b".to_string(),
            ..record.clone()
        };
        assert!(!LockStore::insert(&store, &second).await.unwrap());
        assert!(store.take_over_expired("cold-email-send", &second, at(1)).await.unwrap());
        assert_eq!(store.lock_row("cold-email-send").unwrap().instance_id, "b");
    }

    #[tokio::test]
    async fn lock_take_over_requires_expiry() {
        let store = MemoryStore::new();
        store.seed_lock(LockRecord {
            lock_name: "newsletter-send".to_string(),
            instance_id: "holder".to_string(),
            expires_at: at(100),
        });
        let claimant = LockRecord {
            lock_name: "newsletter-send".to_string(),
            instance_id: "claimant".to_string(),
            expires_at: at(400),
        };

        assert!(!store.take_over_expired("newsletter-send", &claimant, at(99)).await.unwrap());
        assert!(store.take_over_expired("newsletter-send", &claimant, at(100)).await.unwrap());
        assert!(!store.take_over_expired("missing", &claimant, at(500)).await.unwrap());
    }

    #[tokio::test]
    async fn job_transitions_are_predicated() {
        let store = MemoryStore::new();
        let job = JobQueueStore::insert(&store, &new_job(JobType::ColdEmailSend), at(0))
            .await
            .unwrap();

        assert!(!store.complete(job.id, &json!({}), at(1)).await.unwrap());
        assert!(store.claim(job.id, at(1)).await.unwrap());
        assert!(!store.claim(job.id, at(2)).await.unwrap());
        assert!(store.fail(job.id, "boom", at(3)).await.unwrap());
        assert!(!store.complete(job.id, &json!({}), at(4)).await.unwrap());

        let stored = JobQueueStore::find(&store, job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn job_list_filters_and_orders_newest_first() {
        let store = MemoryStore::new();
        for (i, job_type) in [JobType::ColdEmailSend, JobType::NewsletterSend, JobType::ColdEmailSend]
            .into_iter()
            .enumerate()
        {
            JobQueueStore::insert(&store, &new_job(job_type), at(i as i64)).await.unwrap();
        }

        let listed = store
            .list(&JobFilter {
                job_type: Some(JobType::ColdEmailSend),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].created_at, at(2));

        let limited = store
            .list(&JobFilter {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn newsletter_delivery_is_unique_per_subscriber() {
        let store = MemoryStore::new();
        let delivery = NewDelivery {
            issue_id: Uuid::new_v4(),
            subscriber_id: Uuid::new_v4(),
            status: DeliveryStatus::Sent,
            error_message: None,
            delivered_at: at(0),
        };
        assert!(store.record_delivery(&delivery).await.unwrap());
        assert!(!store.record_delivery(&delivery).await.unwrap());
        assert_eq!(store.deliveries(delivery.issue_id).await.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Whatever the insertion order, the oldest pending job of a type is
        /// the one with the smallest `created_at`.
        #[test]
        fn prop_oldest_pending_is_minimum_created_at(offsets in proptest::collection::vec(0i64..10_000, 1..20)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let store = MemoryStore::new();
                for offset in &offsets {
                    JobQueueStore::insert(&store, &new_job(JobType::NewsletterSend), at(*offset))
                        .await
                        .unwrap();
                }
                JobQueueStore::insert(
                    &store,
                    &new_job(JobType::ColdEmailSend),
                    at(-1) - SignedDuration::from_secs(1),
                )
                .await
                .unwrap();

                let oldest = store.oldest_pending(JobType::NewsletterSend).await.unwrap().unwrap();
                let min = offsets.iter().min().copied().unwrap();
                assert_eq!(oldest.created_at, at(min));
                assert_eq!(oldest.job_type, JobType::NewsletterSend);
            });
        }
    }
}
