//! Distributed mutual exclusion over a single conditional-write table row.
//!
//! Existence of the row *is* the lock: `acquire` is a create-if-absent,
//! `release` a delete-if-owner-matches, both single atomic conditional writes
//! against the backing store. There is no expiry — a lock orphaned by a
//! crashed chain must be cleared manually, trading liveness for never
//! double-processing a transfer.

mod memory;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub use memory::MemoryLockStore;

/// The lock table row. At most one row exists per `lock_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRow {
    pub lock_name: String,
    pub owner_id: String,
    pub acquired_time: DateTime<Utc>,
}

/// Outcome of a conditional write against the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The conditional write applied.
    Applied,
    /// The condition failed; the current row is returned for diagnostics.
    Conflict(LockRow),
    /// No row exists for the lock name (conditional delete only).
    Missing,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock already exists for `{lock_name}` (owner `{owner}`, requested by `{requested_by}`)")]
    Exists {
        lock_name: String,
        owner: String,
        requested_by: String,
    },

    #[error("unable to release `{lock_name}` as `{requested_by}` because owner is `{owner}`")]
    ReleaseDenied {
        lock_name: String,
        owner: String,
        requested_by: String,
    },

    #[error("lock store error: {0}")]
    Store(String),
}

/// Backing table for lock rows.
///
/// Implementations must make each method a single atomic conditional write;
/// no read-then-write sequence is acceptable here.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Creates the row if no row exists for its lock name.
    async fn create_if_absent(&self, row: LockRow) -> Result<CasOutcome, LockError>;

    /// Deletes the row only if its current owner matches `owner_id`.
    async fn delete_if_owner(&self, lock_name: &str, owner_id: &str)
    -> Result<CasOutcome, LockError>;

    /// Reads the current row, if any.
    async fn get(&self, lock_name: &str) -> Result<Option<LockRow>, LockError>;
}

/// Whether a lock should survive the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Release now; the transfer is done with the lock.
    Release,
    /// Keep the row for the next invocation in the chain.
    Keep,
}

/// Acquire/release policy shared by every call site.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Takes ownership of the named row.
    ///
    /// A row already owned by `owner_id` is a no-op success — invocations in
    /// the same chain may retry or re-acquire on continuation. A row owned by
    /// anyone else means another transfer is in flight: `LockError::Exists`.
    pub async fn acquire(&self, lock_name: &str, owner_id: &str) -> Result<LockRow, LockError> {
        let row = LockRow {
            lock_name: lock_name.to_string(),
            owner_id: owner_id.to_string(),
            acquired_time: Utc::now(),
        };
        match self.store.create_if_absent(row.clone()).await? {
            CasOutcome::Applied => {
                debug!(lock_name, owner_id, "lock acquired");
                Ok(row)
            }
            CasOutcome::Conflict(existing) if existing.owner_id == owner_id => {
                debug!(lock_name, owner_id, "lock already held by this chain");
                Ok(existing)
            }
            CasOutcome::Conflict(existing) => Err(LockError::Exists {
                lock_name: existing.lock_name,
                owner: existing.owner_id,
                requested_by: owner_id.to_string(),
            }),
            CasOutcome::Missing => Err(LockError::Store(
                "conditional put reported a missing row".to_string(),
            )),
        }
    }

    /// Deletes the named row, but only on behalf of its owner.
    pub async fn release(&self, lock_name: &str, owner_id: &str) -> Result<(), LockError> {
        match self.store.delete_if_owner(lock_name, owner_id).await? {
            CasOutcome::Applied => {
                debug!(lock_name, owner_id, "lock released");
                Ok(())
            }
            CasOutcome::Conflict(existing) => Err(LockError::ReleaseDenied {
                lock_name: existing.lock_name,
                owner: existing.owner_id,
                requested_by: owner_id.to_string(),
            }),
            CasOutcome::Missing => {
                // Already cleared, possibly by operator intervention.
                debug!(lock_name, owner_id, "lock row already gone on release");
                Ok(())
            }
        }
    }

    /// Releases, downgrading a denied release to a warning.
    ///
    /// By the time release is attempted the transfer's useful work is done;
    /// a row taken over out-of-band is not worth failing the invocation for.
    pub async fn release_or_warn(&self, lock_name: &str, owner_id: &str) {
        match self.release(lock_name, owner_id).await {
            Ok(()) => {}
            Err(LockError::ReleaseDenied {
                lock_name,
                owner,
                requested_by,
            }) => {
                warn!(lock_name, owner, requested_by, "lock release denied");
            }
            Err(err) => {
                warn!(lock_name, owner_id, %err, "lock release failed");
            }
        }
    }

    /// Runs `body` with the named lock held.
    ///
    /// The lock is released (denial logged, not raised) whenever `body`
    /// errors and whenever it asks for `Hold::Release`; `Hold::Keep` leaves
    /// the row in place for the next invocation of the chain.
    pub async fn with_lock<T, E, Fut>(
        &self,
        lock_name: &str,
        owner_id: &str,
        body: Fut,
    ) -> Result<T, E>
    where
        E: From<LockError>,
        Fut: Future<Output = Result<(T, Hold), E>>,
    {
        self.acquire(lock_name, owner_id).await?;
        match body.await {
            Ok((value, Hold::Keep)) => Ok(value),
            Ok((value, Hold::Release)) => {
                self.release_or_warn(lock_name, owner_id).await;
                Ok(value)
            }
            Err(err) => {
                self.release_or_warn(lock_name, owner_id).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryLockStore::new()))
    }

    #[tokio::test]
    async fn acquire_creates_row() {
        let lock = lock();
        let row = lock.acquire("SendLock_b_k", "exec-1").await.unwrap();
        assert_eq!(row.lock_name, "SendLock_b_k");
        assert_eq!(row.owner_id, "exec-1");
    }

    #[tokio::test]
    async fn second_owner_is_refused() {
        let lock = lock();
        lock.acquire("L", "exec-1").await.unwrap();
        let err = lock.acquire("L", "exec-2").await.unwrap_err();
        match err {
            LockError::Exists {
                lock_name,
                owner,
                requested_by,
            } => {
                assert_eq!(lock_name, "L");
                assert_eq!(owner, "exec-1");
                assert_eq!(requested_by, "exec-2");
            }
            other => panic!("expected Exists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_owner_reacquire_is_idempotent() {
        let lock = lock();
        let first = lock.acquire("L", "exec-1").await.unwrap();
        let again = lock.acquire("L", "exec-1").await.unwrap();
        // State unchanged: the original acquisition time survives.
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn release_requires_ownership() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = DistributedLock::new(store.clone());
        lock.acquire("L", "exec-1").await.unwrap();

        let err = lock.release("L", "exec-2").await.unwrap_err();
        assert!(matches!(err, LockError::ReleaseDenied { .. }));
        // Row untouched.
        assert_eq!(store.get("L").await.unwrap().unwrap().owner_id, "exec-1");

        lock.release("L", "exec-1").await.unwrap();
        assert!(store.get("L").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_of_missing_row_is_ok() {
        let lock = lock();
        lock.release("L", "exec-1").await.unwrap();
    }

    #[tokio::test]
    async fn acquire_after_release_by_third_owner() {
        let lock = lock();
        lock.acquire("SendLock_bucketA_key1", "exec-1").await.unwrap();
        assert!(lock.acquire("SendLock_bucketA_key1", "exec-2").await.is_err());
        lock.release("SendLock_bucketA_key1", "exec-1").await.unwrap();
        lock.acquire("SendLock_bucketA_key1", "exec-3").await.unwrap();
    }

    #[tokio::test]
    async fn with_lock_releases_on_completion() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = DistributedLock::new(store.clone());
        let out: Result<u32, LockError> =
            lock.with_lock("L", "exec-1", async { Ok((7, Hold::Release)) }).await;
        assert_eq!(out.unwrap(), 7);
        assert!(store.get("L").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn with_lock_keeps_for_continuation() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = DistributedLock::new(store.clone());
        let out: Result<u32, LockError> =
            lock.with_lock("L", "exec-1", async { Ok((7, Hold::Keep)) }).await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(store.get("L").await.unwrap().unwrap().owner_id, "exec-1");
    }

    #[tokio::test]
    async fn with_lock_releases_on_error() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = DistributedLock::new(store.clone());
        let out: Result<u32, LockError> = lock
            .with_lock("L", "exec-1", async {
                Err(LockError::Store("boom".to_string()))
            })
            .await;
        assert!(out.is_err());
        assert!(store.get("L").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn with_lock_propagates_contention() {
        let lock = lock();
        lock.acquire("L", "someone-else").await.unwrap();
        let out: Result<u32, LockError> =
            lock.with_lock("L", "exec-1", async { Ok((7, Hold::Release)) }).await;
        assert!(matches!(out.unwrap_err(), LockError::Exists { .. }));
    }
}
