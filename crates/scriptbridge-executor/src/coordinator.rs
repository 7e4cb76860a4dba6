//! The run coordinator.
//!
//! A [`Coordinator`] owns one interpreter, one [`ExecutionSession`] and the
//! registered extractors, and drives every run through
//! `Idle -> Resetting -> Rewriting -> Running -> Reporting -> Idle`.
//! Whatever the guest does, a run ends in `Idle` with a complete
//! [`RunOutcome`].

use std::{any::Any, panic::AssertUnwindSafe, time::Instant};

use futures::FutureExt;
use scriptbridge_core::{
    Artifact, ArtifactExtractor, BridgeError, Channel, ExecutionSession, ExtractorSet,
    FileToLoad, FsCommand, FsError, FsOutput, GuestException, GuestHost, InputError, InputPort,
    InputRequests, Interpreter, RunContext, fs, input_channel,
};
use serde::{Deserialize, Serialize};

use crate::{config::CoordinatorConfig, responders::InputResponder, rewrite::SourceRewriter};

/// Exception kind recorded when the interpreter itself panics.
pub const PANIC_KIND: &str = "InterpreterPanic";

/// Lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Resetting,
    Rewriting,
    Running,
    Reporting,
}

/// Everything a host learns from one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Name the host gave the source, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub stdout: String,
    pub stderr: String,
    /// Compact JSON of the sent result; `None` when nothing was sent or the
    /// value had no wire form.
    pub result_wire_text: Option<String>,
    /// Set when a result was sent but could not be serialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialization_error: Option<String>,
    /// First guest exception of the run, caught by the wrapper or not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<GuestException>,
    pub artifacts: Vec<Artifact>,
    /// Whether the source was rewritten for awaitable input.
    pub rewritten: bool,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// Whether guest code finished without raising.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Returns the coordinator to `Idle` however a run ends, including when the
/// run future is dropped at a suspension point.
struct PhaseGuard<'a> {
    phase: &'a mut Phase,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a mut Phase) -> Self {
        let mut guard = Self { phase };
        guard.set(Phase::Resetting);
        guard
    }

    fn set(&mut self, next: Phase) {
        tracing::trace!(from = ?*self.phase, to = ?next, "phase transition");
        *self.phase = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase = Phase::Idle;
    }
}

/// Drives guest runs against one session.
pub struct Coordinator<I> {
    interpreter: I,
    session: ExecutionSession,
    extractors: ExtractorSet,
    rewriter: SourceRewriter,
    config: CoordinatorConfig,
    input: InputPort,
    phase: Phase,
    last: Option<RunOutcome>,
}

impl<I: Interpreter> Coordinator<I> {
    /// Coordinator with no extractors and no host answering input.
    #[must_use]
    pub fn new(interpreter: I, config: CoordinatorConfig) -> Self {
        Self {
            interpreter,
            session: ExecutionSession::with_capture_limit(config.capture_limit),
            extractors: ExtractorSet::new(),
            rewriter: SourceRewriter::new(config.rewrite.clone()),
            config,
            input: InputPort::detached(),
            phase: Phase::Idle,
            last: None,
        }
    }

    /// Register an artifact extractor; extractors run in registration order.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn ArtifactExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    #[must_use]
    pub fn with_extractors<E>(mut self, extractors: E) -> Self
    where
        E: IntoIterator<Item = Box<dyn ArtifactExtractor>>,
    {
        for extractor in extractors {
            self.extractors.push(extractor);
        }
        self
    }

    /// Route input requests of later [`run`](Self::run) calls to the
    /// returned receiver. Replaces any previously attached receiver.
    pub fn attach_input(&mut self) -> InputRequests {
        let (port, requests) = input_channel();
        self.input = port;
        requests
    }

    /// Stop answering input; later input calls fail as end-of-input.
    pub fn detach_input(&mut self) {
        self.input = InputPort::detached();
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub const fn interpreter(&self) -> &I {
        &self.interpreter
    }

    pub const fn interpreter_mut(&mut self) -> &mut I {
        &mut self.interpreter
    }

    /// Clear the session and pending façade state without running anything.
    pub fn reset_session(&mut self) {
        let mut phase = PhaseGuard::enter(&mut self.phase);
        self.session.reset();
        self.extractors.reset_all();
        self.last = None;
        phase.set(Phase::Idle);
    }

    /// Apply a host filesystem operation to the interpreter's filesystem.
    ///
    /// # Errors
    /// Returns [`FsError::Unsupported`] if the interpreter has no
    /// filesystem, or the operation's own error.
    pub fn fs(&mut self, command: &FsCommand) -> Result<FsOutput, FsError> {
        let fs = self.interpreter.filesystem().ok_or(FsError::Unsupported)?;
        let output = command.apply(fs);
        if let Err(e) = &output {
            tracing::debug!(operation = ?command.operation, path = %command.path, "fs operation failed: {e}");
        }
        output
    }

    /// Seed the interpreter's filesystem, stopping at the first failure.
    ///
    /// # Errors
    /// Same as [`fs`](Self::fs).
    pub fn load_files(&mut self, files: &[FileToLoad]) -> Result<(), FsError> {
        if files.is_empty() {
            return Ok(());
        }
        let target = self.interpreter.filesystem().ok_or(FsError::Unsupported)?;
        fs::load_files(target, files)?;
        tracing::info!(count = files.len(), "files loaded");
        Ok(())
    }

    /// Run `ctx` with input answered through the attached receiver, if any.
    pub async fn run(&mut self, ctx: RunContext) -> RunOutcome {
        let port = self.input.clone();
        self.execute(ctx, port).await
    }

    /// Run `ctx`, answering each input request with `responder`.
    pub async fn run_with_responder(
        &mut self,
        ctx: RunContext,
        responder: &dyn InputResponder,
    ) -> RunOutcome {
        let (port, mut requests) = input_channel();
        let run = self.execute(ctx, port);
        tokio::pin!(run);

        loop {
            tokio::select! {
                outcome = &mut run => return outcome,
                Some(request) = requests.next() => {
                    let id = request.id();
                    let sent = match responder.respond(request.prompt()).await {
                        Ok(line) => request.respond(line),
                        Err(InputError::Refused(reason)) => request.refuse(reason),
                        Err(other) => request.refuse(other.to_string()),
                    };
                    if let Err(e) = sent {
                        tracing::debug!(id, "input reply dropped: {e}");
                    }
                }
            }
        }
    }

    async fn execute(&mut self, ctx: RunContext, port: InputPort) -> RunOutcome {
        let started = Instant::now();
        let Self {
            interpreter,
            session,
            extractors,
            rewriter,
            config,
            phase,
            last,
            ..
        } = self;
        let mut phase = PhaseGuard::enter(phase);
        tracing::debug!(
            interpreter = interpreter.name(),
            filename = ctx.filename.as_deref().unwrap_or("<string>"),
            "starting run"
        );

        session.reset();
        extractors.reset_all();
        *last = None;

        phase.set(Phase::Rewriting);
        let rewrite = rewriter.rewrite(&ctx.source);
        if let Some(err) = &rewrite.failure {
            let diagnostic = BridgeError::RewriteFailure(err.to_string());
            session
                .capture_mut()
                .write(Channel::Stderr, &format!("{}\n", diagnostic.summary()));
        }

        phase.set(Phase::Running);
        let result = {
            let mut host = GuestHost::new(session, port, config.echo_prompt);
            AssertUnwindSafe(interpreter.execute(&rewrite.source, &ctx.namespace, &mut host))
                .catch_unwind()
                .await
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(exc)) => {
                tracing::debug!(kind = %exc.kind, "guest raised");
                session.record_failure(exc);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(interpreter = interpreter.name(), "interpreter panicked: {message}");
                session.record_failure(GuestException::new(PANIC_KIND, message));
            }
        }

        phase.set(Phase::Reporting);
        let extraction = extractors.extract_all();
        for failure in &extraction.failures {
            session
                .capture_mut()
                .write(Channel::Stderr, &format!("{}\n", failure.summary()));
        }
        session.extend_artifacts(extraction.artifacts);

        let (result_wire_text, serialization_error) = match session.missive().as_wire_text() {
            Ok(text) => (text, None),
            Err(e) => {
                tracing::warn!("result dropped: {e}");
                (None, Some(e.to_string()))
            }
        };
        let output = session.output();
        let outcome = RunOutcome {
            filename: ctx.filename,
            stdout: output.stdout,
            stderr: output.stderr,
            result_wire_text,
            serialization_error,
            failure: session.failure().cloned(),
            artifacts: session.artifacts().to_vec(),
            rewritten: rewrite.was_rewritten,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::debug!(
            elapsed_ms = outcome.elapsed_ms,
            artifacts = outcome.artifacts.len(),
            failed = !outcome.succeeded(),
            "run finished"
        );

        *last = Some(outcome.clone());
        drop(phase);
        outcome
    }

    /// Captured stdout of the last run.
    #[must_use]
    pub fn get_stdout(&self) -> &str {
        self.session.capture().read(Channel::Stdout)
    }

    /// Captured stderr of the last run.
    #[must_use]
    pub fn get_stderr(&self) -> &str {
        self.session.capture().read(Channel::Stderr)
    }

    /// Wire text of the last run's result, if one was sent and serialized.
    #[must_use]
    pub fn get_result_wire_text(&self) -> Option<&str> {
        self.last.as_ref()?.result_wire_text.as_deref()
    }

    /// Artifacts of the last run.
    #[must_use]
    pub fn get_artifacts(&self) -> &[Artifact] {
        self.session.artifacts()
    }

    #[must_use]
    pub const fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last.as_ref()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "interpreter panicked".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use scriptbridge_core::{
        ArtifactError, FsOp, Namespace, artifact::PNG_KIND, artifact::SCENE_KIND,
    };
    use scriptbridge_testkit::MiniInterpreter;
    use serde_json::json;

    use super::*;
    use crate::responders::{NoInput, QueuedInput};

    fn coordinator() -> Coordinator<MiniInterpreter> {
        let interpreter = MiniInterpreter::new();
        let extractors = interpreter.extractors();
        Coordinator::new(interpreter, CoordinatorConfig::default()).with_extractors(extractors)
    }

    #[tokio::test]
    async fn test_result_only() {
        let mut coord = coordinator();
        let outcome = coord.run(RunContext::new(r#"send_result({"x": 1})"#)).await;
        assert_eq!(outcome.stdout, "");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.result_wire_text.as_deref(), Some(r#"{"x":1}"#));
        assert!(outcome.artifacts.is_empty());
        assert!(outcome.succeeded());
        assert_eq!(coord.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_second_send_is_a_protocol_violation() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new(r#"print("hi"); send_result(1); send_result(2)"#))
            .await;
        assert_eq!(outcome.stdout, "hi\n");
        assert_eq!(outcome.result_wire_text.as_deref(), Some("1"));
        assert!(outcome.stderr.starts_with("ProtocolViolation: "));
        assert_eq!(outcome.failure.unwrap().kind, "ProtocolViolation");
    }

    #[tokio::test]
    async fn test_input_suspends_and_resumes() {
        let mut coord = coordinator();
        let responder = QueuedInput::new(["42"]);
        let outcome = coord
            .run_with_responder(
                RunContext::new("answer = input(\"? \")\nprint(answer)"),
                &responder,
            )
            .await;
        assert!(outcome.rewritten);
        assert_eq!(outcome.stdout, "? 42\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(responder.remaining(), 0);
    }

    #[tokio::test]
    async fn test_attached_receiver_answers_input() {
        let mut coord = coordinator();
        let mut requests = coord.attach_input();
        let answering = tokio::spawn(async move {
            let request = requests.next().await.unwrap();
            assert_eq!(request.prompt(), "name? ");
            request.respond("ada").unwrap();
        });
        let outcome = coord
            .run(RunContext::new("send_result(input('name? '))"))
            .await;
        answering.await.unwrap();
        assert_eq!(outcome.result_wire_text.as_deref(), Some("\"ada\""));
    }

    #[tokio::test]
    async fn test_unanswered_input_is_end_of_input() {
        let mut coord = coordinator();
        let outcome = coord
            .run_with_responder(RunContext::new("x = input()\nprint('unreached')"), &NoInput)
            .await;
        assert_eq!(outcome.stdout, "");
        assert!(outcome.stderr.starts_with("EOFError: "));
        assert_eq!(outcome.failure.unwrap().kind, "EOFError");
    }

    #[tokio::test]
    async fn test_uncaught_error_keeps_partial_output() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new("print(\"partial\")\nraise ValueError(\"boom\")"))
            .await;
        assert_eq!(outcome.stdout, "partial\n");
        assert_eq!(outcome.stderr, "ValueError: boom\n");
        assert_eq!(outcome.result_wire_text, None);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_nothing_leaks_between_runs() {
        let mut coord = coordinator();
        let first = coord
            .run(RunContext::new(
                "print('one')\nplot('a')\nsend_result(1)\nraise KeyError('k')",
            ))
            .await;
        assert_eq!(first.artifacts.len(), 1);

        let second = coord.run(RunContext::new("")).await;
        assert_eq!(second.stdout, "");
        assert_eq!(second.stderr, "");
        assert_eq!(second.result_wire_text, None);
        assert!(second.artifacts.is_empty());
        assert!(second.failure.is_none());
        assert_eq!(coord.get_stdout(), "");
        assert_eq!(coord.get_result_wire_text(), None);
    }

    #[tokio::test]
    async fn test_artifacts_in_extractor_order() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new(
                "scene({\"data\": [1, 2]})\nplot('first')\nplot('second')",
            ))
            .await;
        let kinds: Vec<_> = outcome.artifacts.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, [PNG_KIND, PNG_KIND, SCENE_KIND]);
        assert_eq!(outcome.artifacts[2].payload, r#"{"data":[1,2]}"#);
        assert_eq!(coord.get_artifacts(), outcome.artifacts.as_slice());
    }

    #[tokio::test]
    async fn test_extractor_failure_is_isolated() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new("plot_raw('not a png')\nscene({\"k\": 1})\nprint('ok')"))
            .await;
        assert_eq!(outcome.stdout, "ok\n");
        assert!(outcome.stderr.starts_with("ArtifactExtractionFailure: "));
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].kind, SCENE_KIND);
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_unserializable_result_is_flagged() {
        let mut coord = coordinator();
        let outcome = coord.run(RunContext::new("send_result(print)")).await;
        assert_eq!(outcome.result_wire_text, None);
        assert!(outcome.serialization_error.is_some());
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_rewrite_failure_runs_original() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new("x = input()\ns = '''open"))
            .await;
        assert!(!outcome.rewritten);
        assert!(outcome.stderr.starts_with("RewriteFailure: "));
    }

    #[tokio::test]
    async fn test_caught_error_is_reported_once() {
        let mut coord = coordinator();
        let outcome = coord
            .run_with_responder(
                RunContext::new("name = input()\nprint(name)\nraise TypeError('late')"),
                &QueuedInput::new(["bo"]),
            )
            .await;
        assert_eq!(outcome.stdout, "bo\n");
        assert_eq!(outcome.stderr, "TypeError: late\n");
        assert_eq!(outcome.failure.unwrap().message, "late");
    }

    #[tokio::test]
    async fn test_namespace_and_filename() {
        let mut coord = coordinator();
        let mut namespace = Namespace::new();
        namespace.insert("greeting".into(), json!("hello"));
        let outcome = coord
            .run(
                RunContext::new("send_result(greeting + ' world')")
                    .with_filename("main.py")
                    .with_namespace(namespace),
            )
            .await;
        assert_eq!(outcome.filename.as_deref(), Some("main.py"));
        assert_eq!(outcome.result_wire_text.as_deref(), Some("\"hello world\""));
    }

    #[tokio::test]
    async fn test_reset_session_clears_accessors() {
        let mut coord = coordinator();
        coord.run(RunContext::new("print('x')\nsend_result(2)")).await;
        assert_eq!(coord.get_stdout(), "x\n");
        assert_eq!(coord.get_result_wire_text(), Some("2"));

        coord.reset_session();
        assert_eq!(coord.get_stdout(), "");
        assert_eq!(coord.get_stderr(), "");
        assert!(coord.last_outcome().is_none());
        assert_eq!(coord.phase(), Phase::Idle);
    }

    struct Panicking;

    #[async_trait]
    impl Interpreter for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn execute(
            &mut self,
            _source: &str,
            _globals: &Namespace,
            host: &mut GuestHost<'_>,
        ) -> Result<(), GuestException> {
            host.write(Channel::Stdout, "before\n");
            panic!("interpreter bug");
        }
    }

    #[tokio::test]
    async fn test_interpreter_panic_becomes_failure() {
        let mut coord = Coordinator::new(Panicking, CoordinatorConfig::default());
        let outcome = coord.run(RunContext::new("anything")).await;
        assert_eq!(outcome.stdout, "before\n");
        assert_eq!(outcome.stderr, "InterpreterPanic: interpreter bug\n");
        assert_eq!(coord.phase(), Phase::Idle);

        let again = coord.run(RunContext::new("")).await;
        assert_eq!(again.stdout, "before\n");
        assert_eq!(again.stderr, "InterpreterPanic: interpreter bug\n");
    }

    #[tokio::test]
    async fn test_capture_limit_applies() {
        let config = CoordinatorConfig {
            capture_limit: Some(4),
            ..CoordinatorConfig::default()
        };
        let mut coord = Coordinator::new(MiniInterpreter::new(), config);
        let outcome = coord.run(RunContext::new("print('abcdefgh')")).await;
        assert_eq!(outcome.stdout, "abcd");
    }

    #[tokio::test]
    async fn test_narrow_indent_still_runs() {
        let mut config = CoordinatorConfig::default();
        config.rewrite.indent = 4;
        config.echo_prompt = false;
        let mut coord = Coordinator::new(MiniInterpreter::new(), config);
        let outcome = coord
            .run_with_responder(
                RunContext::new("if True:\n    n = input('n? ')\nprint(n)"),
                &QueuedInput::new(["42"]),
            )
            .await;
        assert!(outcome.rewritten);
        assert_eq!(outcome.stdout, "42\n");
        assert_eq!(outcome.stderr, "");
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_abandoned_run_forgets_previous_result() {
        let mut coord = coordinator();
        coord.run(RunContext::new("send_result(1)")).await;
        assert_eq!(coord.get_result_wire_text(), Some("1"));

        let _requests = coord.attach_input();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            coord.run(RunContext::new("print('second')\nx = input('? ')")),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(coord.phase(), Phase::Idle);
        assert_eq!(coord.get_stdout(), "second\n? ");
        assert_eq!(coord.get_result_wire_text(), None);
        assert!(coord.last_outcome().is_none());
    }

    #[tokio::test]
    async fn test_caught_protocol_violation_keeps_first_result() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new(
                "send_result(1)\ntry:\n    send_result(2)\nexcept ProtocolViolation as e:\n    print('caught')",
            ))
            .await;
        assert_eq!(outcome.stdout, "caught\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.result_wire_text.as_deref(), Some("1"));
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_reset_session_after_failed_run() {
        let mut coord = coordinator();
        let outcome = coord
            .run(RunContext::new("print('out')\nraise ValueError('x')"))
            .await;
        assert_eq!(outcome.stderr, "ValueError: x\n");

        coord.reset_session();
        assert_eq!(coord.get_stdout(), "");
        assert_eq!(coord.get_stderr(), "");
        assert_eq!(coord.get_result_wire_text(), None);
        assert!(coord.get_artifacts().is_empty());
        assert!(coord.last_outcome().is_none());
        assert_eq!(coord.phase(), Phase::Idle);
    }

    struct Exploding;

    impl ArtifactExtractor for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }
        fn available(&self) -> bool {
            true
        }
        fn reset(&mut self) -> Result<(), ArtifactError> {
            Ok(())
        }
        fn extract(&mut self) -> Vec<Result<Artifact, ArtifactError>> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn test_panicking_extractor_still_reports() {
        let interpreter = MiniInterpreter::new();
        let extractors = interpreter.extractors();
        let mut coord = Coordinator::new(interpreter, CoordinatorConfig::default())
            .with_extractor(Box::new(Exploding))
            .with_extractors(extractors);
        let outcome = coord
            .run(RunContext::new("plot('a')\nsend_result(3)\nprint('done')"))
            .await;
        assert_eq!(outcome.stdout, "done\n");
        assert_eq!(
            outcome.stderr,
            "ArtifactExtractionFailure: exploding: extractor panicked: boom\n"
        );
        assert_eq!(outcome.result_wire_text.as_deref(), Some("3"));
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.succeeded());
        assert_eq!(coord.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_host_files_reach_the_guest() {
        let mut coord = coordinator();
        coord
            .load_files(&[FileToLoad {
                path: "/data/name.txt".into(),
                content: "ada".into(),
            }])
            .unwrap();
        let outcome = coord
            .run(RunContext::new("write_file('/data/out.txt', 'hi ' + read_file('/data/name.txt'))"))
            .await;
        assert!(outcome.succeeded());

        let read = coord.fs(&FsCommand::new(FsOp::ReadFile, "/data/out.txt")).unwrap();
        assert_eq!(read, FsOutput::Content { content: "hi ada".into() });
        let listed = coord.fs(&FsCommand::new(FsOp::Listdir, "/data")).unwrap();
        assert_eq!(
            listed,
            FsOutput::Files {
                files: vec!["name.txt".into(), "out.txt".into()]
            }
        );
        assert_eq!(
            coord.fs(&FsCommand::new(FsOp::Mkdir, "/data")),
            Err(FsError::AlreadyExists("/data".into()))
        );
    }

    #[tokio::test]
    async fn test_fs_without_filesystem_is_unsupported() {
        let mut coord = Coordinator::new(Panicking, CoordinatorConfig::default());
        assert_eq!(
            coord.fs(&FsCommand::new(FsOp::Exists, "/")),
            Err(FsError::Unsupported)
        );
        assert!(coord.load_files(&[]).is_ok());
        assert_eq!(
            coord.load_files(&[FileToLoad {
                path: "/a".into(),
                content: String::new(),
            }]),
            Err(FsError::Unsupported)
        );
    }
}
