//! Session orchestration and run storage for the execution bridge.
//!
//! Provides:
//! - `SessionManager` - one coordinator per session, many sessions per process
//! - `RunStorage` and its in-memory implementation

pub mod manager;
pub mod storage;

pub use manager::{InterpreterFactory, ManagerError, SessionId, SessionManager};
pub use storage::{RunFilter, RunId, RunRecord, RunStatus, RunStorage, StorageError};
