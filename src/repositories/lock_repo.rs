//! Lock table repository for async database operations.
//!
//! Every method is one statement so the database provides the atomicity the
//! lock manager relies on.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::lock::LockRecord;
use crate::store::LockStore;

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::vera_distributed_locks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct LockRow {
    lock_name: String,
    instance_id: String,
    expires_at: jiff_diesel::Timestamp,
}

impl From<&LockRecord> for LockRow {
    fn from(record: &LockRecord) -> Self {
        Self {
            lock_name: record.lock_name.clone(),
            instance_id: record.instance_id.clone(),
            expires_at: record.expires_at.to_diesel(),
        }
    }
}

impl From<LockRow> for LockRecord {
    fn from(row: LockRow) -> Self {
        Self {
            lock_name: row.lock_name,
            instance_id: row.instance_id,
            expires_at: row.expires_at.to_jiff(),
        }
    }
}

/// PostgreSQL-backed lock store.
#[derive(Clone)]
pub struct LockRepository {
    pool: AsyncDbPool,
}

impl LockRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for LockRepository {
    async fn insert(&self, record: &LockRecord) -> AppResult<bool> {
        use crate::schema::vera_distributed_locks::dsl::*;
        let mut conn = self.pool.get().await?;

        let inserted = diesel::insert_into(vera_distributed_locks)
            .values(LockRow::from(record))
            .on_conflict(lock_name)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(inserted == 1)
    }

    async fn find(&self, name: &str) -> AppResult<Option<LockRecord>> {
        use crate::schema::vera_distributed_locks::dsl::*;
        let mut conn = self.pool.get().await?;

        let row = vera_distributed_locks
            .filter(lock_name.eq(name))
            .select(LockRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(LockRecord::from))
    }

    async fn take_over_expired(
        &self,
        name: &str,
        record: &LockRecord,
        now: Timestamp,
    ) -> AppResult<bool> {
        use crate::schema::vera_distributed_locks::dsl::*;
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            vera_distributed_locks
                .filter(lock_name.eq(name))
                .filter(expires_at.le(now.to_diesel())),
        )
        .set((
            instance_id.eq(&record.instance_id),
            expires_at.eq(record.expires_at.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn delete_owned(&self, name: &str, owner: &str) -> AppResult<bool> {
        use crate::schema::vera_distributed_locks::dsl::*;
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(
            vera_distributed_locks
                .filter(lock_name.eq(name))
                .filter(instance_id.eq(owner)),
        )
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(deleted == 1)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(())
    }
}
