use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::{ItemOutcome, batch_limit, parse_payload, run_batch};
use crate::config::TaskSettings;
use crate::delivery::{Delivery, OutgoingEmail};
use crate::error::{AppError, AppResult};
use crate::jobs::models::Job;
use crate::jobs::types::{JobHandler, JobType};
use crate::lock::Lease;
use crate::models::{DeliveryStatus, NewDelivery, NewsletterIssue, Subscriber};
use crate::store::NewsletterStore;

#[derive(Debug, Deserialize)]
struct NewsletterPayload {
    issue_id: Uuid,
    newsletter_id: Uuid,
}

/// Delivers one batch of a newsletter issue to subscribers without a
/// delivery row for it.
///
/// The (issue, subscriber) uniqueness of delivery rows makes a rerun after a
/// crash skip everyone already recorded.
pub struct NewsletterProcessor {
    newsletters: Arc<dyn NewsletterStore>,
    delivery: Delivery,
    settings: TaskSettings,
}

impl NewsletterProcessor {
    pub fn new(
        newsletters: Arc<dyn NewsletterStore>,
        delivery: Delivery,
        settings: TaskSettings,
    ) -> Self {
        Self {
            newsletters,
            delivery,
            settings,
        }
    }

    async fn deliver(&self, issue: &NewsletterIssue, subscriber: Subscriber) -> AppResult<ItemOutcome> {
        let email = OutgoingEmail {
            to: subscriber.email.clone(),
            from: self.delivery.from_address.clone(),
            subject: issue.subject.clone(),
            body: issue.body.clone(),
            workspace_id: issue.workspace_id,
            reference_id: subscriber.id,
        };

        let (status, error_message) = match self.delivery.mailer.send(&email).await {
            Ok(_) => (DeliveryStatus::Sent, None),
            Err(error) => {
                tracing::warn!(
                    issue_id = %issue.id,
                    subscriber_id = %subscriber.id,
                    error = %error,
                    "Newsletter delivery bounced"
                );
                (DeliveryStatus::Bounced, Some(error.to_string()))
            }
        };

        let recorded = self
            .newsletters
            .record_delivery(&NewDelivery {
                issue_id: issue.id,
                subscriber_id: subscriber.id,
                status,
                error_message,
                delivered_at: Timestamp::now(),
            })
            .await?;

        Ok(match (recorded, status) {
            (false, _) => ItemOutcome::Skipped,
            (true, DeliveryStatus::Sent) => ItemOutcome::Delivered,
            (true, DeliveryStatus::Bounced) => ItemOutcome::Rejected,
        })
    }
}

#[async_trait]
impl JobHandler for NewsletterProcessor {
    fn job_type(&self) -> JobType {
        JobType::NewsletterSend
    }

    async fn handle(&self, job: &Job, _lease: &Lease) -> AppResult<JsonValue> {
        let payload: NewsletterPayload = parse_payload(job)?;
        let issue = self
            .newsletters
            .find_issue(payload.issue_id)
            .await?
            .ok_or_else(|| AppError::not_found("NewsletterIssue", "id", payload.issue_id))?;
        if issue.newsletter_id != payload.newsletter_id {
            return Err(AppError::validation(
                "payload.newsletter_id",
                format!(
                    "Issue {} belongs to newsletter {}, not {}",
                    issue.id, issue.newsletter_id, payload.newsletter_id
                ),
            ));
        }

        let subscribers = self
            .newsletters
            .undelivered_subscribers(
                issue.id,
                issue.newsletter_id,
                batch_limit(self.settings.batch_size),
            )
            .await?;
        tracing::info!(
            job_id = %job.id,
            issue_id = %issue.id,
            batch = subscribers.len(),
            "Sending newsletter batch"
        );

        let tally = run_batch(subscribers, self.settings.send_concurrency, |subscriber| {
            self.deliver(&issue, subscriber)
        })
        .await?;

        let progress = self
            .newsletters
            .record_issue_progress(issue.id, issue.newsletter_id, tally.delivered, Timestamp::now())
            .await?;

        Ok(json!({
            "sent": tally.delivered,
            "bounced": tally.rejected,
            "remaining": progress.remaining,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobsConfig;
    use crate::jobs::JobStatus;
    use crate::models::SubscriberStatus;
    use crate::store::MemoryStore;
    use jiff::SignedDuration;

    struct Fixture {
        store: MemoryStore,
        issue: NewsletterIssue,
        workspace_id: Uuid,
    }

    async fn fixture(subscribers: &[(&str, SubscriberStatus)]) -> Fixture {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();
        let issue = NewsletterIssue {
            id: Uuid::new_v4(),
            newsletter_id: Uuid::new_v4(),
            workspace_id,
            subject: "Weekly digest".to_string(),
            body: "News".to_string(),
            status: "scheduled".to_string(),
            recipient_count: 0,
            sent_count: 0,
            sent_at: None,
            created_at: Timestamp::now(),
        };
        store.insert_issue(issue.clone()).await;

        let base = Timestamp::now() - SignedDuration::from_secs(3600);
        for (i, (email, status)) in subscribers.iter().enumerate() {
            store
                .insert_subscriber(Subscriber {
                    id: Uuid::new_v4(),
                    newsletter_id: issue.newsletter_id,
                    email: email.to_string(),
                    status: *status,
                    created_at: base + SignedDuration::from_secs(i as i64),
                })
                .await;
        }

        Fixture {
            store,
            issue,
            workspace_id,
        }
    }

    fn job(payload: JsonValue, workspace_id: Uuid) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::NewsletterSend,
            workspace_id,
            payload,
            status: JobStatus::Processing,
            created_at: Timestamp::now(),
            started_at: Some(Timestamp::now()),
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    fn lease() -> Lease {
        Lease {
            lock_name: "newsletter-send".to_string(),
            instance_id: Uuid::new_v4().to_string(),
            expires_at: Timestamp::now() + SignedDuration::from_secs(300),
        }
    }

    fn processor(store: &MemoryStore, batch_size: usize) -> NewsletterProcessor {
        let jobs = JobsConfig {
            batch_size,
            ..Default::default()
        };
        NewsletterProcessor::new(
            Arc::new(store.clone()),
            Delivery::log("digest@vera.local"),
            jobs.task_settings(JobType::NewsletterSend),
        )
    }

    impl Fixture {
        fn job(&self) -> Job {
            job(
                json!({ "issue_id": self.issue.id, "newsletter_id": self.issue.newsletter_id }),
                self.workspace_id,
            )
        }
    }

    #[tokio::test]
    async fn test_delivers_to_active_subscribers_only() {
        let fx = fixture(&[
            ("ada@example.com", SubscriberStatus::Active),
            ("gone@example.com", SubscriberStatus::Unsubscribed),
            ("bad-address", SubscriberStatus::Active),
        ])
        .await;

        let result = processor(&fx.store, 500)
            .handle(&fx.job(), &lease())
            .await
            .unwrap();

        assert_eq!(result["sent"], 1);
        assert_eq!(result["bounced"], 1);
        assert_eq!(result["remaining"], 0);

        let deliveries = fx.store.deliveries(fx.issue.id).await;
        assert_eq!(deliveries.len(), 2);

        let issue = fx.store.issue(fx.issue.id).await.unwrap();
        assert_eq!(issue.status, NewsletterIssue::STATUS_SENT);
        assert_eq!(issue.recipient_count, 2);
        assert_eq!(issue.sent_count, 1);
        assert!(issue.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_rerun_skips_already_delivered_subscribers() {
        let fx = fixture(&[
            ("a@example.com", SubscriberStatus::Active),
            ("b@example.com", SubscriberStatus::Active),
            ("c@example.com", SubscriberStatus::Active),
        ])
        .await;
        let processor = processor(&fx.store, 2);

        let first = processor.handle(&fx.job(), &lease()).await.unwrap();
        assert_eq!(first["sent"], 2);
        assert_eq!(first["remaining"], 1);
        assert_eq!(
            fx.store.issue(fx.issue.id).await.unwrap().status,
            NewsletterIssue::STATUS_SENDING
        );

        let second = processor.handle(&fx.job(), &lease()).await.unwrap();
        assert_eq!(second["sent"], 1);
        assert_eq!(second["remaining"], 0);

        let third = processor.handle(&fx.job(), &lease()).await.unwrap();
        assert_eq!(third["sent"], 0);
        assert_eq!(fx.store.deliveries(fx.issue.id).await.len(), 3);
        assert_eq!(fx.store.issue(fx.issue.id).await.unwrap().sent_count, 3);
    }

    #[tokio::test]
    async fn test_mismatched_newsletter_is_rejected() {
        let fx = fixture(&[("a@example.com", SubscriberStatus::Active)]).await;
        let job = job(
            json!({ "issue_id": fx.issue.id, "newsletter_id": Uuid::new_v4() }),
            fx.workspace_id,
        );

        let error = processor(&fx.store, 500)
            .handle(&job, &lease())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation { .. }));
        assert!(fx.store.deliveries(fx.issue.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_issue_fails_job() {
        let store = MemoryStore::new();
        let job = job(
            json!({ "issue_id": Uuid::new_v4(), "newsletter_id": Uuid::new_v4() }),
            Uuid::new_v4(),
        );

        let error = processor(&store, 500).handle(&job, &lease()).await.unwrap_err();
        assert!(matches!(error, AppError::NotFound { .. }));
    }
}
