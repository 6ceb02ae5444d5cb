use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CampaignProgress, ColdEmailCampaign, Recipient, RecipientStatus};
use crate::schema::{vera_cold_email_campaigns, vera_cold_email_recipients};
use crate::store::CampaignStore;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = vera_cold_email_campaigns)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct CampaignRow {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    subject: String,
    body: String,
    status: String,
    recipient_count: i32,
    sent_count: i32,
    created_at: jiff_diesel::Timestamp,
    updated_at: jiff_diesel::Timestamp,
}

impl From<CampaignRow> for ColdEmailCampaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            subject: row.subject,
            body: row.body,
            status: row.status,
            recipient_count: row.recipient_count,
            sent_count: row.sent_count,
            created_at: row.created_at.to_jiff(),
            updated_at: row.updated_at.to_jiff(),
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = vera_cold_email_recipients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct RecipientRow {
    id: Uuid,
    campaign_id: Uuid,
    email: String,
    status: RecipientStatus,
    sent_at: Option<jiff_diesel::Timestamp>,
    error_message: Option<String>,
    created_at: jiff_diesel::Timestamp,
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Self {
            id: row.id,
            campaign_id: row.campaign_id,
            email: row.email,
            status: row.status,
            sent_at: row.sent_at.map(|t| t.to_jiff()),
            error_message: row.error_message,
            created_at: row.created_at.to_jiff(),
        }
    }
}

/// Cold email campaigns and recipients stored in PostgreSQL.
#[derive(Clone)]
pub struct CampaignRepository {
    pool: AsyncDbPool,
}

impl CampaignRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for CampaignRepository {
    async fn find_campaign(&self, campaign_id: Uuid) -> AppResult<Option<ColdEmailCampaign>> {
        let mut conn = self.pool.get().await?;

        let row = vera_cold_email_campaigns::table
            .find(campaign_id)
            .select(CampaignRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(ColdEmailCampaign::from))
    }

    async fn pending_recipients(&self, campaign_id: Uuid, limit: i64) -> AppResult<Vec<Recipient>> {
        use crate::schema::vera_cold_email_recipients::dsl;
        let mut conn = self.pool.get().await?;

        let rows = dsl::vera_cold_email_recipients
            .filter(dsl::campaign_id.eq(campaign_id))
            .filter(dsl::status.eq(RecipientStatus::Pending))
            .order((dsl::created_at.asc(), dsl::id.asc()))
            .limit(limit)
            .select(RecipientRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(Recipient::from).collect())
    }

    async fn mark_recipient_sent(&self, recipient_id: Uuid, now: Timestamp) -> AppResult<bool> {
        use crate::schema::vera_cold_email_recipients::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_cold_email_recipients
                .filter(id.eq(recipient_id))
                .filter(status.eq(RecipientStatus::Pending)),
        )
        .set((
            status.eq(RecipientStatus::Sent),
            sent_at.eq(now.to_diesel()),
            error_message.eq(None::<String>),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn mark_recipient_bounced(&self, recipient_id: Uuid, message: &str) -> AppResult<bool> {
        use crate::schema::vera_cold_email_recipients::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_cold_email_recipients
                .filter(id.eq(recipient_id))
                .filter(status.eq(RecipientStatus::Pending)),
        )
        .set((status.eq(RecipientStatus::Bounced), error_message.eq(message)))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn record_campaign_progress(
        &self,
        campaign_id: Uuid,
        sent: i32,
        now: Timestamp,
    ) -> AppResult<CampaignProgress> {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let total: i64 = vera_cold_email_recipients::table
                    .filter(vera_cold_email_recipients::campaign_id.eq(campaign_id))
                    .count()
                    .get_result(conn)
                    .await?;
                let pending: i64 = vera_cold_email_recipients::table
                    .filter(vera_cold_email_recipients::campaign_id.eq(campaign_id))
                    .filter(vera_cold_email_recipients::status.eq(RecipientStatus::Pending))
                    .count()
                    .get_result(conn)
                    .await?;

                let next_status = if pending == 0 {
                    ColdEmailCampaign::STATUS_SENT
                } else {
                    ColdEmailCampaign::STATUS_SENDING
                };
                let recipient_count = i32::try_from(total).unwrap_or(i32::MAX);

                let (recipient_count, sent_count): (i32, i32) =
                    diesel::update(vera_cold_email_campaigns::table.find(campaign_id))
                        .set((
                            vera_cold_email_campaigns::sent_count
                                .eq(vera_cold_email_campaigns::sent_count + sent),
                            vera_cold_email_campaigns::recipient_count.eq(recipient_count),
                            vera_cold_email_campaigns::status.eq(next_status),
                            vera_cold_email_campaigns::updated_at.eq(now.to_diesel()),
                        ))
                        .returning((
                            vera_cold_email_campaigns::recipient_count,
                            vera_cold_email_campaigns::sent_count,
                        ))
                        .get_result(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| AppError::not_found("Campaign", "id", campaign_id))?;

                Ok(CampaignProgress {
                    recipient_count,
                    sent_count,
                    pending,
                })
            }
            .scope_boxed()
        })
        .await
    }
}
