//! Single-task worker loop around one coordinator.
//!
//! The worker reads [`HostMessage`]s from an inbox and writes
//! [`WorkerMessage`]s to an outbox. While a script is suspended on input the
//! loop keeps reading the inbox, so the host's `input_response` can resume the
//! run; nothing else can start until the run has reported.

use std::sync::Arc;

use scriptbridge_core::{InputRequest, Interpreter, RunContext};
use scriptbridge_executor::Coordinator;
use scriptbridge_session::InterpreterFactory;
use tokio::sync::mpsc;

use crate::protocol::{HostMessage, TransportError, WorkerMessage};

type Outbox = mpsc::UnboundedSender<WorkerMessage>;

fn send(outbox: &Outbox, msg: WorkerMessage) -> Result<(), TransportError> {
    outbox.send(msg).map_err(|_| TransportError::Closed)
}

/// Message loop for one host connection.
pub struct Worker<F: InterpreterFactory> {
    factory: Arc<F>,
    coordinator: Option<Coordinator<F::Interpreter>>,
}

impl<F: InterpreterFactory> Worker<F> {
    #[must_use]
    pub const fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            coordinator: None,
        }
    }

    /// Serve until the inbox closes.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] if the outbox is dropped.
    pub async fn serve(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<HostMessage>,
        outbox: Outbox,
    ) -> Result<(), TransportError> {
        while let Some(msg) = inbox.recv().await {
            match msg {
                HostMessage::Init { config, files } => {
                    if self.coordinator.is_some() {
                        send(&outbox, WorkerMessage::error("worker is already initialized"))?;
                        continue;
                    }
                    let (interpreter, extractors) = self.factory.create();
                    let name = interpreter.name().to_string();
                    let mut coordinator =
                        Coordinator::new(interpreter, config).with_extractors(extractors);
                    if let Err(e) = coordinator.load_files(&files) {
                        tracing::warn!(interpreter = %name, "init aborted: {e}");
                        send(&outbox, WorkerMessage::error(format!("failed to load files: {e}")))?;
                        continue;
                    }
                    tracing::info!(interpreter = %name, files = files.len(), "worker initialized");
                    self.coordinator = Some(coordinator);
                    send(&outbox, WorkerMessage::Ready)?;
                }
                HostMessage::FsOperation { command } => {
                    let reply = match self.coordinator.as_mut() {
                        Some(coordinator) => match coordinator.fs(&command) {
                            Ok(result) => WorkerMessage::FsResult { result },
                            Err(e) => WorkerMessage::FsError { error: e.to_string() },
                        },
                        None => WorkerMessage::FsError {
                            error: "worker is not initialized".to_string(),
                        },
                    };
                    send(&outbox, reply)?;
                }
                HostMessage::Reset => match self.coordinator.as_mut() {
                    Some(coordinator) => {
                        coordinator.reset_session();
                        send(&outbox, WorkerMessage::Ready)?;
                    }
                    None => send(&outbox, WorkerMessage::error("worker is not initialized"))?,
                },
                HostMessage::Ping => send(&outbox, WorkerMessage::Pong)?,
                HostMessage::InputResponse { .. } => {
                    send(&outbox, WorkerMessage::error("no input is pending"))?;
                }
                execute @ HostMessage::Execute { .. } => {
                    let Some(coordinator) = self.coordinator.as_mut() else {
                        send(&outbox, WorkerMessage::error("worker is not initialized"))?;
                        continue;
                    };
                    let Some(ctx) = execute.into_context() else {
                        continue;
                    };
                    if !run(coordinator, ctx, &mut inbox, &outbox).await? {
                        break;
                    }
                }
            }
        }
        tracing::debug!("inbox closed, worker stopping");
        Ok(())
    }
}

/// Drive one run while relaying input. Returns `false` if the inbox closed
/// during the run.
async fn run<I: Interpreter>(
    coordinator: &mut Coordinator<I>,
    ctx: RunContext,
    inbox: &mut mpsc::UnboundedReceiver<HostMessage>,
    outbox: &Outbox,
) -> Result<bool, TransportError> {
    let mut requests = coordinator.attach_input();
    let mut pending: Option<InputRequest> = None;
    let mut inbox_open = true;

    let run = coordinator.run(ctx);
    tokio::pin!(run);

    loop {
        tokio::select! {
            outcome = &mut run => {
                if let Err(e) = send(outbox, WorkerMessage::Result { outcome }) {
                    tracing::error!("result could not be delivered: {e}");
                    return Err(e);
                }
                return Ok(inbox_open);
            }
            Some(request) = requests.next(), if pending.is_none() => {
                send(outbox, WorkerMessage::InputRequired { prompt: request.prompt().to_string() })?;
                pending = Some(request);
            }
            msg = inbox.recv(), if inbox_open => match msg {
                Some(HostMessage::InputResponse { input }) => match pending.take() {
                    Some(request) => {
                        if let Err(e) = request.respond(input) {
                            tracing::warn!("input arrived after the run moved on: {e}");
                        }
                    }
                    None => send(outbox, WorkerMessage::error("no input is pending"))?,
                },
                Some(HostMessage::Ping) => send(outbox, WorkerMessage::Pong)?,
                Some(HostMessage::FsOperation { .. }) => send(
                    outbox,
                    WorkerMessage::FsError { error: "worker is busy running a script".to_string() },
                )?,
                Some(_) => send(outbox, WorkerMessage::error("worker is busy running a script"))?,
                None => {
                    // host is gone; a pending input call fails as end-of-input
                    inbox_open = false;
                    pending = None;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use scriptbridge_core::{ArtifactExtractor, FileToLoad, FsCommand, FsOp, FsOutput};
    use scriptbridge_executor::CoordinatorConfig;
    use scriptbridge_testkit::MiniInterpreter;

    use super::*;

    type Factory = fn() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>);

    fn mini() -> (MiniInterpreter, Vec<Box<dyn ArtifactExtractor>>) {
        let interpreter = MiniInterpreter::new();
        let extractors = interpreter.extractors();
        (interpreter, extractors)
    }

    struct Harness {
        inbox: mpsc::UnboundedSender<HostMessage>,
        outbox: mpsc::UnboundedReceiver<WorkerMessage>,
        task: tokio::task::JoinHandle<Result<(), TransportError>>,
    }

    impl Harness {
        fn start() -> Self {
            let (inbox, inbox_rx) = mpsc::unbounded_channel();
            let (outbox_tx, outbox) = mpsc::unbounded_channel();
            let worker = Worker::new(Arc::new(mini as Factory));
            let task = tokio::spawn(worker.serve(inbox_rx, outbox_tx));
            Self {
                inbox,
                outbox,
                task,
            }
        }

        fn send(&self, msg: HostMessage) {
            self.inbox.send(msg).unwrap();
        }

        async fn next(&mut self) -> WorkerMessage {
            self.outbox.recv().await.unwrap()
        }
    }

    fn init() -> HostMessage {
        HostMessage::Init {
            config: CoordinatorConfig::default(),
            files: Vec::new(),
        }
    }

    fn execute(code: &str) -> HostMessage {
        HostMessage::Execute {
            code: code.into(),
            filename: None,
            namespace: None,
        }
    }

    #[tokio::test]
    async fn test_init_execute_result() {
        let mut h = Harness::start();
        h.send(init());
        assert!(matches!(h.next().await, WorkerMessage::Ready));

        h.send(execute("print('hi'); send_result([1, 2])"));
        let WorkerMessage::Result { outcome } = h.next().await else {
            panic!("expected result");
        };
        assert_eq!(outcome.stdout, "hi\n");
        assert_eq!(outcome.result_wire_text.as_deref(), Some("[1,2]"));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let mut h = Harness::start();
        h.send(execute("print(1)"));
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));

        h.send(init());
        assert!(matches!(h.next().await, WorkerMessage::Ready));
        h.send(init());
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));

        h.send(HostMessage::InputResponse { input: "x".into() });
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));
        h.send(HostMessage::Ping);
        assert!(matches!(h.next().await, WorkerMessage::Pong));
    }

    #[tokio::test]
    async fn test_input_round_trip() {
        let mut h = Harness::start();
        h.send(init());
        h.next().await;

        h.send(execute("a = input('first? ')\nb = input('second? ')\nprint(a + b)"));
        let WorkerMessage::InputRequired { prompt } = h.next().await else {
            panic!("expected input request");
        };
        assert_eq!(prompt, "first? ");

        h.send(execute("print('ignored')"));
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));

        h.send(HostMessage::InputResponse { input: "4".into() });
        let WorkerMessage::InputRequired { prompt } = h.next().await else {
            panic!("expected second input request");
        };
        assert_eq!(prompt, "second? ");
        h.send(HostMessage::InputResponse { input: "2".into() });

        let WorkerMessage::Result { outcome } = h.next().await else {
            panic!("expected result");
        };
        assert_eq!(outcome.stdout, "first? second? 42\n");
        assert!(outcome.rewritten);
    }

    #[tokio::test]
    async fn test_host_disconnect_mid_input() {
        let mut h = Harness::start();
        h.send(init());
        h.next().await;
        h.send(execute("x = input()"));
        assert!(matches!(h.next().await, WorkerMessage::InputRequired { .. }));

        let Harness { inbox, mut outbox, task } = h;
        drop(inbox);
        let WorkerMessage::Result { outcome } = outbox.recv().await.unwrap() else {
            panic!("expected result");
        };
        assert_eq!(outcome.failure.unwrap().kind, "EOFError");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reset_acknowledged() {
        let mut h = Harness::start();
        h.send(HostMessage::Reset);
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));
        h.send(init());
        h.next().await;
        h.send(HostMessage::Reset);
        assert!(matches!(h.next().await, WorkerMessage::Ready));
    }

    fn fs_op(command: FsCommand) -> HostMessage {
        HostMessage::FsOperation { command }
    }

    #[tokio::test]
    async fn test_init_files_and_fs_operations() {
        let mut h = Harness::start();
        h.send(fs_op(FsCommand::new(FsOp::Exists, "/")));
        let WorkerMessage::FsError { error } = h.next().await else {
            panic!("expected fs error");
        };
        assert_eq!(error, "worker is not initialized");

        h.send(HostMessage::Init {
            config: CoordinatorConfig::default(),
            files: vec![FileToLoad {
                path: "/data/n.txt".into(),
                content: "41".into(),
            }],
        });
        assert!(matches!(h.next().await, WorkerMessage::Ready));

        h.send(execute("write_file('/data/out.txt', str(int(read_file('/data/n.txt')) + 1))"));
        let WorkerMessage::Result { outcome } = h.next().await else {
            panic!("expected result");
        };
        assert!(outcome.succeeded());

        h.send(fs_op(FsCommand::new(FsOp::ReadFile, "/data/out.txt")));
        let WorkerMessage::FsResult { result } = h.next().await else {
            panic!("expected fs result");
        };
        assert_eq!(result, FsOutput::Content { content: "42".into() });

        h.send(fs_op(FsCommand::new(FsOp::ReadFile, "/missing")));
        let WorkerMessage::FsError { error } = h.next().await else {
            panic!("expected fs error");
        };
        assert_eq!(error, "No such file or directory: /missing");
    }

    #[tokio::test]
    async fn test_bad_init_files_abort_init() {
        let mut h = Harness::start();
        h.send(HostMessage::Init {
            config: CoordinatorConfig::default(),
            files: vec![
                FileToLoad { path: "/a".into(), content: "1".into() },
                FileToLoad { path: "/a/b".into(), content: "2".into() },
            ],
        });
        let WorkerMessage::Error { message } = h.next().await else {
            panic!("expected init error");
        };
        assert_eq!(message, "failed to load files: Not a directory: /a/b");

        h.send(execute("print(1)"));
        assert!(matches!(h.next().await, WorkerMessage::Error { .. }));
        h.send(init());
        assert!(matches!(h.next().await, WorkerMessage::Ready));
    }

    #[tokio::test]
    async fn test_fs_while_running_is_busy() {
        let mut h = Harness::start();
        h.send(init());
        h.next().await;
        h.send(execute("x = input('? ')\nprint(x)"));
        assert!(matches!(h.next().await, WorkerMessage::InputRequired { .. }));

        h.send(fs_op(FsCommand::new(FsOp::Listdir, "/")));
        let WorkerMessage::FsError { error } = h.next().await else {
            panic!("expected busy fs error");
        };
        assert_eq!(error, "worker is busy running a script");

        h.send(HostMessage::InputResponse { input: "ok".into() });
        let WorkerMessage::Result { outcome } = h.next().await else {
            panic!("expected result");
        };
        assert_eq!(outcome.stdout, "? ok\n");
    }
}
