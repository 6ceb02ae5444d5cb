use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{AgentEvent, AgentEventStatus};
use crate::store::AgentEventStore;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::vera_agent_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AgentEventRow {
    id: Uuid,
    workspace_id: Uuid,
    agent_id: Uuid,
    event_type: String,
    payload: JsonValue,
    status: AgentEventStatus,
    processed_at: Option<jiff_diesel::Timestamp>,
    error_message: Option<String>,
    created_at: jiff_diesel::Timestamp,
}

impl From<AgentEventRow> for AgentEvent {
    fn from(row: AgentEventRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            agent_id: row.agent_id,
            event_type: row.event_type,
            payload: row.payload,
            status: row.status,
            processed_at: row.processed_at.map(|t| t.to_jiff()),
            error_message: row.error_message,
            created_at: row.created_at.to_jiff(),
        }
    }
}

/// Agent events stored in PostgreSQL.
#[derive(Clone)]
pub struct AgentEventRepository {
    pool: AsyncDbPool,
}

impl AgentEventRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentEventStore for AgentEventRepository {
    async fn pending_events(
        &self,
        workspace: Uuid,
        agent: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<AgentEvent>> {
        use crate::schema::vera_agent_events::dsl::*;
        let mut conn = self.pool.get().await?;

        let mut query = vera_agent_events
            .filter(workspace_id.eq(workspace))
            .filter(status.eq(AgentEventStatus::Pending))
            .into_boxed();
        if let Some(agent) = agent {
            query = query.filter(agent_id.eq(agent));
        }

        let rows = query
            .order((created_at.asc(), id.asc()))
            .limit(limit)
            .select(AgentEventRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(AgentEvent::from).collect())
    }

    async fn mark_event_processed(&self, event_id: Uuid, now: Timestamp) -> AppResult<bool> {
        use crate::schema::vera_agent_events::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_agent_events
                .filter(id.eq(event_id))
                .filter(status.eq(AgentEventStatus::Pending)),
        )
        .set((
            status.eq(AgentEventStatus::Processed),
            processed_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn mark_event_failed(
        &self,
        event_id: Uuid,
        message: &str,
        now: Timestamp,
    ) -> AppResult<bool> {
        use crate::schema::vera_agent_events::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_agent_events
                .filter(id.eq(event_id))
                .filter(status.eq(AgentEventStatus::Pending)),
        )
        .set((
            status.eq(AgentEventStatus::Failed),
            processed_at.eq(now.to_diesel()),
            error_message.eq(message),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }
}
