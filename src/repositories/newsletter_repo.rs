use async_trait::async_trait;
use diesel::dsl::{exists, not};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    DeliveryStatus, IssueProgress, NewDelivery, NewsletterIssue, Subscriber, SubscriberStatus,
};
use crate::schema::{vera_newsletter_deliveries, vera_newsletter_issues, vera_newsletter_subscribers};
use crate::store::NewsletterStore;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = vera_newsletter_issues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct IssueRow {
    id: Uuid,
    newsletter_id: Uuid,
    workspace_id: Uuid,
    subject: String,
    body: String,
    status: String,
    recipient_count: i32,
    sent_count: i32,
    sent_at: Option<jiff_diesel::Timestamp>,
    created_at: jiff_diesel::Timestamp,
}

impl From<IssueRow> for NewsletterIssue {
    fn from(row: IssueRow) -> Self {
        Self {
            id: row.id,
            newsletter_id: row.newsletter_id,
            workspace_id: row.workspace_id,
            subject: row.subject,
            body: row.body,
            status: row.status,
            recipient_count: row.recipient_count,
            sent_count: row.sent_count,
            sent_at: row.sent_at.map(|t| t.to_jiff()),
            created_at: row.created_at.to_jiff(),
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = vera_newsletter_subscribers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct SubscriberRow {
    id: Uuid,
    newsletter_id: Uuid,
    email: String,
    status: SubscriberStatus,
    created_at: jiff_diesel::Timestamp,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Self {
            id: row.id,
            newsletter_id: row.newsletter_id,
            email: row.email,
            status: row.status,
            created_at: row.created_at.to_jiff(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vera_newsletter_deliveries)]
struct NewDeliveryRow<'a> {
    issue_id: Uuid,
    subscriber_id: Uuid,
    status: DeliveryStatus,
    error_message: Option<&'a str>,
    delivered_at: jiff_diesel::Timestamp,
}

/// Newsletter issues, subscribers and deliveries stored in PostgreSQL.
#[derive(Clone)]
pub struct NewsletterRepository {
    pool: AsyncDbPool,
}

impl NewsletterRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Active subscribers of a newsletter that have no delivery row for an issue.
macro_rules! undelivered {
    ($issue_id:expr, $newsletter_id:expr) => {
        vera_newsletter_subscribers::table
            .filter(vera_newsletter_subscribers::newsletter_id.eq($newsletter_id))
            .filter(vera_newsletter_subscribers::status.eq(SubscriberStatus::Active))
            .filter(not(exists(
                vera_newsletter_deliveries::table
                    .filter(vera_newsletter_deliveries::issue_id.eq($issue_id))
                    .filter(
                        vera_newsletter_deliveries::subscriber_id
                            .eq(vera_newsletter_subscribers::id),
                    ),
            )))
    };
}

#[async_trait]
impl NewsletterStore for NewsletterRepository {
    async fn find_issue(&self, issue_id: Uuid) -> AppResult<Option<NewsletterIssue>> {
        let mut conn = self.pool.get().await?;

        let row = vera_newsletter_issues::table
            .find(issue_id)
            .select(IssueRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(NewsletterIssue::from))
    }

    async fn undelivered_subscribers(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Subscriber>> {
        let mut conn = self.pool.get().await?;

        let rows = undelivered!(issue_id, newsletter_id)
            .order((
                vera_newsletter_subscribers::created_at.asc(),
                vera_newsletter_subscribers::id.asc(),
            ))
            .limit(limit)
            .select(SubscriberRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }

    async fn record_delivery(&self, delivery: &NewDelivery) -> AppResult<bool> {
        use crate::schema::vera_newsletter_deliveries::dsl::*;
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(vera_newsletter_deliveries)
            .values(NewDeliveryRow {
                issue_id: delivery.issue_id,
                subscriber_id: delivery.subscriber_id,
                status: delivery.status,
                error_message: delivery.error_message.as_deref(),
                delivered_at: delivery.delivered_at.to_diesel(),
            })
            .on_conflict((issue_id, subscriber_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(inserted == 1)
    }

    async fn record_issue_progress(
        &self,
        issue_id: Uuid,
        newsletter_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<IssueProgress> {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let active: i64 = vera_newsletter_subscribers::table
                    .filter(vera_newsletter_subscribers::newsletter_id.eq(newsletter_id))
                    .filter(vera_newsletter_subscribers::status.eq(SubscriberStatus::Active))
                    .count()
                    .get_result(conn)
                    .await?;
                let remaining: i64 = undelivered!(issue_id, newsletter_id)
                    .count()
                    .get_result(conn)
                    .await?;

                let recipient_count = i32::try_from(active).unwrap_or(i32::MAX);
                let target = vera_newsletter_issues::table.find(issue_id);
                let counters = (
                    vera_newsletter_issues::sent_count.eq(vera_newsletter_issues::sent_count + sent),
                    vera_newsletter_issues::recipient_count.eq(recipient_count),
                );
                let returning = (
                    vera_newsletter_issues::recipient_count,
                    vera_newsletter_issues::sent_count,
                );

                let updated: Option<(i32, i32)> = if remaining == 0 {
                    diesel::update(target)
                        .set((
                            counters,
                            vera_newsletter_issues::status.eq(NewsletterIssue::STATUS_SENT),
                            vera_newsletter_issues::sent_at.eq(now.to_diesel()),
                        ))
                        .returning(returning)
                        .get_result(conn)
                        .await
                        .optional()?
                } else {
                    diesel::update(target)
                        .set((
                            counters,
                            vera_newsletter_issues::status.eq(NewsletterIssue::STATUS_SENDING),
                        ))
                        .returning(returning)
                        .get_result(conn)
                        .await
                        .optional()?
                };

                let (recipient_count, sent_count) = updated
                    .ok_or_else(|| AppError::not_found("NewsletterIssue", "id", issue_id))?;

                Ok(IssueProgress {
                    recipient_count,
                    sent_count,
                    remaining,
                })
            }
            .scope_boxed()
        })
        .await
    }
}
