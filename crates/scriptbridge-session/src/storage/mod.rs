//! Run record storage.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

use async_trait::async_trait;
use scriptbridge_executor::RunOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::manager::SessionId;

/// Unique identifier for one run.
pub type RunId = Uuid;

/// Run lifecycle as seen by storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Guest code finished without raising.
    Completed,
    /// Guest code raised; the outcome is still complete.
    Failed,
    /// The run was abandoned before it produced an outcome.
    Cancelled,
}

/// One stored run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub session_id: SessionId,
    pub filename: Option<String>,
    pub status: RunStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub outcome: Option<RunOutcome>,
}

/// Filter for listing runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub session_id: Option<SessionId>,
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    NotFound(RunId),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for persisting run records.
///
/// Hosts that poll for results read from here; the manager writes a record
/// when a run starts and completes it when the outcome is known.
#[async_trait]
pub trait RunStorage: Send + Sync {
    /// Record a run that is starting.
    async fn create(&self, session_id: SessionId, filename: Option<&str>) -> Result<RunId, StorageError>;

    /// Get a run by ID.
    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, StorageError>;

    /// Attach the outcome and settle the status.
    async fn finish(&self, id: RunId, outcome: RunOutcome) -> Result<(), StorageError>;

    /// Mark a run that is still running as cancelled. A settled run is left
    /// as it is.
    async fn cancel(&self, id: RunId) -> Result<(), StorageError>;

    /// List runs, newest first.
    async fn list(&self, filter: RunFilter) -> Result<Vec<RunRecord>, StorageError>;

    /// Drop every record of a session. Returns how many were removed.
    async fn purge_session(&self, session_id: SessionId) -> Result<usize, StorageError>;
}
