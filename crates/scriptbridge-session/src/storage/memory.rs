//! In-memory run storage.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use scriptbridge_executor::RunOutcome;
use uuid::Uuid;

use super::{RunFilter, RunId, RunRecord, RunStatus, RunStorage, StorageError};
use crate::manager::SessionId;

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStorage {
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn poisoned(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl RunStorage for MemoryStorage {
    async fn create(&self, session_id: SessionId, filename: Option<&str>) -> Result<RunId, StorageError> {
        let id = Uuid::new_v4();
        let timestamp = now();

        let record = RunRecord {
            id,
            session_id,
            filename: filename.map(str::to_string),
            status: RunStatus::Running,
            created_at: timestamp,
            updated_at: timestamp,
            outcome: None,
        };

        self.runs.write().map_err(poisoned)?.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, StorageError> {
        Ok(self.runs.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn finish(&self, id: RunId, outcome: RunOutcome) -> Result<(), StorageError> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        let record = runs.get_mut(&id).ok_or(StorageError::NotFound(id))?;

        record.status = if outcome.succeeded() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        record.outcome = Some(outcome);
        record.updated_at = now();

        Ok(())
    }

    async fn cancel(&self, id: RunId) -> Result<(), StorageError> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        let record = runs.get_mut(&id).ok_or(StorageError::NotFound(id))?;

        if record.status == RunStatus::Running {
            record.status = RunStatus::Cancelled;
            record.updated_at = now();
        }
        Ok(())
    }

    async fn list(&self, filter: RunFilter) -> Result<Vec<RunRecord>, StorageError> {
        let runs = self.runs.read().map_err(poisoned)?;

        let mut result: Vec<RunRecord> = runs
            .values()
            .filter(|r| filter.session_id.is_none_or(|id| r.session_id == id))
            .filter(|r| filter.status.is_none_or(|status| r.status == status))
            .cloned()
            .collect();

        // Newest first
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        Ok(result)
    }

    async fn purge_session(&self, session_id: SessionId) -> Result<usize, StorageError> {
        let mut runs = self.runs.write().map_err(poisoned)?;
        let before = runs.len();
        runs.retain(|_, r| r.session_id != session_id);
        Ok(before - runs.len())
    }
}
