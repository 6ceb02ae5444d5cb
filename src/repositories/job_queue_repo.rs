//! Job queue repository.
//!
//! State transitions are single UPDATE statements predicated on the expected
//! current status, so a second claimant observes zero affected rows.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::jobs::{Job, JobFilter, JobStatus, JobType, NewJob};
use crate::store::JobQueueStore;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::vera_jobs_queue)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct JobRow {
    id: Uuid,
    job_type: String,
    workspace_id: Uuid,
    payload: JsonValue,
    status: JobStatus,
    created_at: jiff_diesel::Timestamp,
    started_at: Option<jiff_diesel::Timestamp>,
    completed_at: Option<jiff_diesel::Timestamp>,
    result: Option<JsonValue>,
    error_message: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::vera_jobs_queue)]
struct NewJobRow<'a> {
    job_type: &'a str,
    workspace_id: Uuid,
    payload: &'a JsonValue,
    status: JobStatus,
    created_at: jiff_diesel::Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let job_type = row.job_type.parse::<JobType>().map_err(|e| AppError::Database {
            operation: format!("decode job {}", row.id),
            source: anyhow::Error::from(e),
        })?;

        Ok(Job {
            id: row.id,
            job_type,
            workspace_id: row.workspace_id,
            payload: row.payload,
            status: row.status,
            created_at: row.created_at.to_jiff(),
            started_at: row.started_at.map(|t| t.to_jiff()),
            completed_at: row.completed_at.map(|t| t.to_jiff()),
            result: row.result,
            error_message: row.error_message,
        })
    }
}

/// Decodes listed rows, skipping job types this worker does not know.
///
/// The web application may enqueue kinds handled elsewhere; an operator
/// listing must not fail because of them.
fn decode_listed(rows: Vec<JobRow>) -> Vec<Job> {
    rows.into_iter()
        .filter_map(|row| {
            let row_id = row.id;
            Job::try_from(row)
                .inspect_err(|e| tracing::warn!(job_id = %row_id, error = %e, "Skipping undecodable job row"))
                .ok()
        })
        .collect()
}

/// PostgreSQL-backed job queue.
#[derive(Clone)]
pub struct JobQueueRepository {
    pool: AsyncDbPool,
}

impl JobQueueRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueueStore for JobQueueRepository {
    async fn insert(&self, new_job: &NewJob, now: Timestamp) -> AppResult<Job> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(vera_jobs_queue)
            .values(NewJobRow {
                job_type: new_job.job_type.as_str(),
                workspace_id: new_job.workspace_id,
                payload: &new_job.payload,
                status: JobStatus::Pending,
                created_at: now.to_diesel(),
            })
            .returning(JobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?;

        Job::try_from(row)
    }

    async fn oldest_pending(&self, kind: JobType) -> AppResult<Option<Job>> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        vera_jobs_queue
            .filter(job_type.eq(kind.as_str()))
            .filter(status.eq(JobStatus::Pending))
            .order((created_at.asc(), id.asc()))
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(Job::try_from)
            .transpose()
    }

    async fn claim(&self, job_id: Uuid, now: Timestamp) -> AppResult<bool> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_jobs_queue
                .filter(id.eq(job_id))
                .filter(status.eq(JobStatus::Pending)),
        )
        .set((status.eq(JobStatus::Processing), started_at.eq(now.to_diesel())))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn complete(&self, job_id: Uuid, outcome: &JsonValue, now: Timestamp) -> AppResult<bool> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_jobs_queue
                .filter(id.eq(job_id))
                .filter(status.eq(JobStatus::Processing)),
        )
        .set((
            status.eq(JobStatus::Completed),
            completed_at.eq(now.to_diesel()),
            result.eq(outcome),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn fail(&self, job_id: Uuid, message: &str, now: Timestamp) -> AppResult<bool> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_jobs_queue
                .filter(id.eq(job_id))
                .filter(status.eq(JobStatus::Processing)),
        )
        .set((
            status.eq(JobStatus::Failed),
            completed_at.eq(now.to_diesel()),
            error_message.eq(message),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn find(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        vera_jobs_queue
            .filter(id.eq(job_id))
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        use crate::schema::vera_jobs_queue::dsl::*;
        let mut conn = self.pool.get().await?;

        let mut query = vera_jobs_queue.into_boxed();
        query = match filter.job_type {
            Some(kind) => query.filter(job_type.eq(kind.as_str())),
            None => query.filter(job_type.eq_any(JobType::all_names())),
        };
        if let Some(wanted) = filter.status {
            query = query.filter(status.eq(wanted));
        }

        let rows = query
            .order(created_at.desc())
            .limit(filter.limit)
            .select(JobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(decode_listed(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(kind: &str) -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            job_type: kind.to_string(),
            workspace_id: Uuid::new_v4(),
            payload: json!({}),
            status: JobStatus::Pending,
            created_at: Timestamp::now().to_diesel(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    #[test]
    fn test_unknown_job_type_fails_strict_decode() {
        let error = Job::try_from(row("sms-send")).unwrap_err();
        assert!(matches!(error, AppError::Database { .. }));
    }

    #[test]
    fn test_listing_skips_unknown_job_types() {
        let known = row("newsletter-send");
        let known_id = known.id;

        let jobs = decode_listed(vec![row("sms-send"), known, row("")]);

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, known_id);
        assert_eq!(jobs[0].job_type, JobType::NewsletterSend);
    }
}
