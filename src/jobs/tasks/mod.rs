//! Task processors, one per job type.
//!
//! Each processor loads the row referenced by the job payload, works through
//! one bounded batch of dependent items and advances every item on its own.
//! A delivery failure is recorded against its item and never aborts the
//! batch; a store failure does.

mod agent_events;
mod cold_email;
mod newsletter;

pub use agent_events::AgentEventProcessor;
pub use cold_email::ColdEmailProcessor;
pub use newsletter::NewsletterProcessor;

use std::future::Future;

use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::jobs::models::Job;

/// What happened to one item of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Delivered,
    Rejected,
    /// Advanced by someone else between the read and the write
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    delivered: i32,
    rejected: i32,
    skipped: i32,
}

/// Run `f` over `items` with at most `concurrency` in flight.
///
/// Every item is driven to completion before the first store error, if any,
/// is returned.
async fn run_batch<T, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> AppResult<Tally>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = AppResult<ItemOutcome>>,
{
    let outcomes: Vec<AppResult<ItemOutcome>> = stream::iter(items)
        .map(f)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut tally = Tally::default();
    for outcome in outcomes {
        match outcome? {
            ItemOutcome::Delivered => tally.delivered += 1,
            ItemOutcome::Rejected => tally.rejected += 1,
            ItemOutcome::Skipped => tally.skipped += 1,
        }
    }
    Ok(tally)
}

fn parse_payload<T: DeserializeOwned>(job: &Job) -> AppResult<T> {
    serde_json::from_value(job.payload.clone()).map_err(|e| {
        AppError::validation("payload", format!("Invalid {} payload: {e}", job.job_type))
    })
}

fn batch_limit(batch_size: usize) -> i64 {
    i64::try_from(batch_size).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_batch_counts_outcomes() {
        let tally = run_batch(vec![1, 2, 3, 4, 5], 2, |n| async move {
            Ok(match n % 3 {
                0 => ItemOutcome::Rejected,
                1 => ItemOutcome::Delivered,
                _ => ItemOutcome::Skipped,
            })
        })
        .await
        .unwrap();

        assert_eq!(
            tally,
            Tally {
                delivered: 2,
                rejected: 1,
                skipped: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_run_batch_surfaces_store_errors() {
        let result = run_batch(vec![1, 2], 1, |n| async move {
            if n == 2 {
                Err(AppError::not_found("Recipient", "id", n))
            } else {
                Ok(ItemOutcome::Delivered)
            }
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[test]
    fn test_parse_payload_reports_validation_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Payload {
            campaign_id: Uuid,
        }

        let job = Job {
            id: Uuid::new_v4(),
            job_type: crate::jobs::JobType::ColdEmailSend,
            workspace_id: Uuid::new_v4(),
            payload: json!({ "campaign_id": "not-a-uuid" }),
            status: crate::jobs::JobStatus::Processing,
            created_at: jiff::Timestamp::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        };

        let error = parse_payload::<Payload>(&job).unwrap_err();
        match error {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "payload");
                assert!(reason.contains("cold-email-send"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
