use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use jiff::Timestamp;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::lock::{Lease, LockRecord, LockStore};

/// Acquires, releases and scopes leases on named locks.
///
/// Cloning is cheap; all clones share the same store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Try once to become the holder of `lock_name` for `ttl`.
    ///
    /// Inserts a fresh row; on a duplicate key, takes over the existing row
    /// only if it has expired. Losing either race yields `Ok(None)`. Never
    /// blocks or retries.
    pub async fn acquire(&self, lock_name: &str, ttl: Duration) -> AppResult<Option<Lease>> {
        let now = Timestamp::now();
        let record = LockRecord {
            lock_name: lock_name.to_string(),
            instance_id: Uuid::new_v4().to_string(),
            expires_at: now.checked_add(ttl).map_err(|e| AppError::Internal {
                source: anyhow::anyhow!("lock expiry out of range: {e}"),
            })?,
        };

        if self.store.insert(&record).await? {
            tracing::debug!(
                lock_name,
                instance_id = %record.instance_id,
                expires_at = %record.expires_at,
                "Lock acquired"
            );
            return Ok(Some(record.into()));
        }

        let Some(current) = self.store.find(lock_name).await? else {
            // Released between our insert and read; the next tick will retry.
            tracing::debug!(lock_name, "Lock vanished after insert conflict");
            return Ok(None);
        };

        if !current.is_expired(now) {
            tracing::debug!(
                lock_name,
                holder = %current.instance_id,
                expires_at = %current.expires_at,
                "Lock held by another instance"
            );
            return Ok(None);
        }

        if self.store.take_over_expired(lock_name, &record, now).await? {
            tracing::info!(
                lock_name,
                instance_id = %record.instance_id,
                previous_holder = %current.instance_id,
                "Took over expired lock"
            );
            Ok(Some(record.into()))
        } else {
            tracing::debug!(lock_name, "Lost takeover race for expired lock");
            Ok(None)
        }
    }

    /// Delete the lock row if it is still owned by `instance_id`.
    ///
    /// Returns `false` (not an error) when the row is gone or owned by
    /// another instance.
    pub async fn release(&self, lock_name: &str, instance_id: &str) -> AppResult<bool> {
        let released = self.store.delete_owned(lock_name, instance_id).await?;
        if released {
            tracing::debug!(lock_name, instance_id, "Lock released");
        } else {
            tracing::warn!(
                lock_name,
                instance_id,
                "Lock was not released: no longer owned by this instance"
            );
        }
        Ok(released)
    }

    /// Whether `lease` still names the current, unexpired owner.
    pub async fn is_held(&self, lease: &Lease) -> AppResult<bool> {
        let now = Timestamp::now();
        Ok(self
            .store
            .find(&lease.lock_name)
            .await?
            .is_some_and(|current| current.instance_id == lease.instance_id && !current.is_expired(now)))
    }

    /// Run `f` while holding `lock_name`.
    ///
    /// Returns `Ok(None)` without calling `f` when the lock is held elsewhere.
    /// The lock is released whether `f` returns `Ok`, returns `Err` or panics;
    /// a panic is resumed after the release attempt. An error from `f` takes
    /// precedence over a failed release.
    pub async fn with_lock<T, F, Fut>(&self, lock_name: &str, ttl: Duration, f: F) -> AppResult<Option<T>>
    where
        F: FnOnce(Lease) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let Some(lease) = self.acquire(lock_name, ttl).await? else {
            return Ok(None);
        };

        let guarded = lease.clone();
        let outcome = AssertUnwindSafe(async move { f(guarded).await })
            .catch_unwind()
            .await;

        let released = self.release(&lease.lock_name, &lease.instance_id).await;

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(Some(value))
            }
            Ok(Err(error)) => {
                if let Err(release_error) = released {
                    tracing::error!(
                        lock_name = %lease.lock_name,
                        error = %release_error,
                        "Failed to release lock after task error"
                    );
                }
                Err(error)
            }
            Err(panic) => {
                if let Err(release_error) = released {
                    tracing::error!(
                        lock_name = %lease.lock_name,
                        error = %release_error,
                        "Failed to release lock after task panic"
                    );
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
