use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{CasOutcome, LockError, LockRow, LockStore};

/// In-memory lock table for tests and local runs.
///
/// A single mutex around the map gives the same per-row atomicity the real
/// table guarantees for conditional writes.
#[derive(Default)]
pub struct MemoryLockStore {
    rows: Mutex<HashMap<String, LockRow>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn create_if_absent(&self, row: LockRow) -> Result<CasOutcome, LockError> {
        let mut rows = self.rows.lock().await;
        match rows.get(&row.lock_name) {
            Some(existing) => Ok(CasOutcome::Conflict(existing.clone())),
            None => {
                rows.insert(row.lock_name.clone(), row);
                Ok(CasOutcome::Applied)
            }
        }
    }

    async fn delete_if_owner(
        &self,
        lock_name: &str,
        owner_id: &str,
    ) -> Result<CasOutcome, LockError> {
        let mut rows = self.rows.lock().await;
        match rows.get(lock_name) {
            None => Ok(CasOutcome::Missing),
            Some(existing) if existing.owner_id != owner_id => {
                Ok(CasOutcome::Conflict(existing.clone()))
            }
            Some(_) => {
                rows.remove(lock_name);
                Ok(CasOutcome::Applied)
            }
        }
    }

    async fn get(&self, lock_name: &str) -> Result<Option<LockRow>, LockError> {
        Ok(self.rows.lock().await.get(lock_name).cloned())
    }
}
