//! Lease-based distributed lock.
//!
//! A lock is a row keyed by name holding the owner's random instance id and
//! an absolute expiry. There is no renewal: a holder keeps the lock until it
//! releases it or the expiry passes, after which any claimant may take it
//! over with a predicated update.

mod manager;

pub use manager::LockManager;

use jiff::Timestamp;
use serde::Serialize;

pub use crate::store::LockStore;

/// A row of the lock table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub lock_name: String,
    pub instance_id: String,
    pub expires_at: Timestamp,
}

impl LockRecord {
    /// Stale once `now >= expires_at`, regardless of holder
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Proof of ownership handed to the closure guarded by a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lease {
    pub lock_name: String,
    pub instance_id: String,
    pub expires_at: Timestamp,
}

impl From<LockRecord> for Lease {
    fn from(record: LockRecord) -> Self {
        Self {
            lock_name: record.lock_name,
            instance_id: record.instance_id,
            expires_at: record.expires_at,
        }
    }
}
