//! Session manager for running many independent sessions.

use std::{collections::HashMap, sync::Arc};

use scriptbridge_core::{ArtifactExtractor, InputRequests, Interpreter, RunContext};
use scriptbridge_executor::{Coordinator, CoordinatorConfig, InputResponder, RunOutcome};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::storage::{RunFilter, RunId, RunRecord, RunStorage, StorageError};

/// Unique identifier for a session.
pub type SessionId = Uuid;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session already running")]
    AlreadyRunning,
}

/// Builds a fresh interpreter, with the extractors for its façades, for
/// every new session.
pub trait InterpreterFactory: Send + Sync {
    type Interpreter: Interpreter + 'static;

    fn create(&self) -> (Self::Interpreter, Vec<Box<dyn ArtifactExtractor>>);
}

impl<F, I> InterpreterFactory for F
where
    F: Fn() -> (I, Vec<Box<dyn ArtifactExtractor>>) + Send + Sync,
    I: Interpreter + 'static,
{
    type Interpreter = I;

    fn create(&self) -> (I, Vec<Box<dyn ArtifactExtractor>>) {
        self()
    }
}

type SharedCoordinator<I> = Arc<Mutex<Coordinator<I>>>;

/// Marks a stored run cancelled unless its outcome was recorded.
///
/// A run future dropped at an await (a host timeout, a closed connection)
/// never reaches `finish`; this guard settles the record from `Drop`.
struct PendingRun<S: RunStorage + 'static> {
    storage: Arc<S>,
    id: Option<RunId>,
}

impl<S: RunStorage + 'static> PendingRun<S> {
    const fn new(storage: Arc<S>, id: RunId) -> Self {
        Self { storage, id: Some(id) }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl<S: RunStorage + 'static> Drop for PendingRun<S> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(run_id = %id, "run abandoned outside a runtime, record left running");
            return;
        };
        let storage = Arc::clone(&self.storage);
        runtime.spawn(async move {
            match storage.cancel(id).await {
                Ok(()) => tracing::info!(run_id = %id, "run cancelled"),
                Err(e) => tracing::warn!(run_id = %id, "failed to mark run cancelled: {e}"),
            }
        });
    }
}

/// Owns one coordinator per open session.
///
/// Sessions share nothing mutable: each has its own interpreter, capture
/// buffers, result slot and façades. A session runs one script at a time;
/// different sessions may run concurrently.
pub struct SessionManager<S, F>
where
    S: RunStorage,
    F: InterpreterFactory,
{
    storage: Arc<S>,
    factory: F,
    config: CoordinatorConfig,
    sessions: RwLock<HashMap<SessionId, SharedCoordinator<F::Interpreter>>>,
}

impl<S, F> SessionManager<S, F>
where
    S: RunStorage + 'static,
    F: InterpreterFactory,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(storage: S, factory: F, config: CoordinatorConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            factory,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Open a new session with a fresh interpreter.
    pub async fn open(&self) -> SessionId {
        let (interpreter, extractors) = self.factory.create();
        let coordinator = Coordinator::new(interpreter, self.config.clone()).with_extractors(extractors);
        let id = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(coordinator)));
        tracing::debug!(session_id = %id, "session opened");
        id
    }

    /// Close a session. Its stored runs remain until purged.
    ///
    /// # Errors
    /// Returns error if the session does not exist.
    pub async fn close(&self, id: SessionId) -> Result<(), ManagerError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(drop)
            .ok_or(ManagerError::NotFound(id))?;
        tracing::debug!(session_id = %id, "session closed");
        Ok(())
    }

    /// Ids of open sessions.
    pub async fn list(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    async fn coordinator(&self, id: SessionId) -> Result<SharedCoordinator<F::Interpreter>, ManagerError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(Arc::clone)
            .ok_or(ManagerError::NotFound(id))
    }

    /// Route input of later runs in this session to the returned receiver.
    ///
    /// # Errors
    /// Returns error if the session does not exist or is running.
    pub async fn attach_input(&self, id: SessionId) -> Result<InputRequests, ManagerError> {
        let coordinator = self.coordinator(id).await?;
        let mut coordinator = coordinator.try_lock().map_err(|_| ManagerError::AlreadyRunning)?;
        Ok(coordinator.attach_input())
    }

    /// Run a script in a session and record it.
    ///
    /// # Errors
    /// Returns error if the session does not exist, is already running, or
    /// the run cannot be recorded.
    pub async fn run(&self, id: SessionId, ctx: RunContext) -> Result<RunOutcome, ManagerError> {
        self.run_inner(id, ctx, None).await
    }

    /// Like [`run`](Self::run), answering input with `responder`.
    ///
    /// # Errors
    /// Same as [`run`](Self::run).
    pub async fn run_with_responder(
        &self,
        id: SessionId,
        ctx: RunContext,
        responder: &dyn InputResponder,
    ) -> Result<RunOutcome, ManagerError> {
        self.run_inner(id, ctx, Some(responder)).await
    }

    async fn run_inner(
        &self,
        id: SessionId,
        ctx: RunContext,
        responder: Option<&dyn InputResponder>,
    ) -> Result<RunOutcome, ManagerError> {
        let coordinator = self.coordinator(id).await?;
        let mut coordinator = coordinator.try_lock().map_err(|_| ManagerError::AlreadyRunning)?;

        let run_id = self.storage.create(id, ctx.filename.as_deref()).await?;
        let pending = PendingRun::new(Arc::clone(&self.storage), run_id);
        let outcome = match responder {
            Some(responder) => coordinator.run_with_responder(ctx, responder).await,
            None => coordinator.run(ctx).await,
        };
        drop(coordinator);

        self.storage.finish(run_id, outcome.clone()).await?;
        pending.disarm();
        tracing::info!(
            session_id = %id,
            run_id = %run_id,
            succeeded = outcome.succeeded(),
            "run recorded"
        );
        Ok(outcome)
    }

    /// Stored runs of one session, newest first.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub async fn history(&self, id: SessionId, limit: Option<usize>) -> Result<Vec<RunRecord>, ManagerError> {
        Ok(self
            .storage
            .list(RunFilter {
                session_id: Some(id),
                limit,
                ..RunFilter::default()
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scriptbridge_executor::QueuedInput;
    use scriptbridge_testkit::MiniInterpreter;

    use super::*;
    use crate::storage::{MemoryStorage, RunStatus};

    fn mini() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>) {
        let interpreter = MiniInterpreter::new();
        let extractors = interpreter.extractors();
        (interpreter, extractors)
    }

    fn manager() -> SessionManager<MemoryStorage, fn() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>)> {
        SessionManager::new(MemoryStorage::new(), mini, CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = manager();
        let a = manager.open().await;
        let b = manager.open().await;

        let (out_a, out_b) = tokio::join!(
            manager.run(a, RunContext::new("x = 'a'\nplot(x)\nsend_result(x)")),
            manager.run(b, RunContext::new("print('b')")),
        );
        let (out_a, out_b) = (out_a.unwrap(), out_b.unwrap());
        assert_eq!(out_a.result_wire_text.as_deref(), Some("\"a\""));
        assert_eq!(out_a.artifacts.len(), 1);
        assert_eq!(out_b.stdout, "b\n");
        assert_eq!(out_b.result_wire_text, None);
        assert!(out_b.artifacts.is_empty());

        let mut open = manager.list().await;
        open.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(open, expected);
    }

    #[tokio::test]
    async fn test_runs_are_recorded() {
        let manager = manager();
        let id = manager.open().await;
        manager
            .run(id, RunContext::new("print(1)").with_filename("one.py"))
            .await
            .unwrap();
        manager
            .run_with_responder(
                id,
                RunContext::new("v = input()\nraise ValueError(v)"),
                &QueuedInput::new(["bad"]),
            )
            .await
            .unwrap();

        let history = manager.history(id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        let failed: Vec<_> = history.iter().filter(|r| r.status == RunStatus::Failed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].outcome.as_ref().unwrap().stderr, "ValueError: bad\n");
        assert!(history.iter().any(|r| r.filename.as_deref() == Some("one.py")));
    }

    #[tokio::test]
    async fn test_unknown_and_closed_sessions() {
        let manager = manager();
        let id = manager.open().await;
        manager.close(id).await.unwrap();
        assert!(matches!(
            manager.run(id, RunContext::new("")).await,
            Err(ManagerError::NotFound(_))
        ));
        assert!(matches!(manager.close(id).await, Err(ManagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_attached_input_per_session() {
        let manager = manager();
        let id = manager.open().await;
        let mut requests = manager.attach_input(id).await.unwrap();
        let (outcome, ()) = tokio::join!(
            manager.run(id, RunContext::new("send_result(input('q'))")),
            async {
                requests.next().await.unwrap().respond("yes").unwrap();
            }
        );
        assert_eq!(outcome.unwrap().result_wire_text.as_deref(), Some("\"yes\""));
    }

    #[tokio::test]
    async fn test_abandoned_run_is_cancelled() {
        let manager = manager();
        let id = manager.open().await;
        let _requests = manager.attach_input(id).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            manager.run(id, RunContext::new("x = input('never answered')")),
        )
        .await;
        assert!(abandoned.is_err());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let history = manager.history(id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Cancelled);
        assert!(history[0].outcome.is_none());

        manager.run(id, RunContext::new("print('again')")).await.unwrap();
        let history = manager.history(id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.iter().filter(|r| r.status == RunStatus::Completed).count(),
            1
        );
    }
}
