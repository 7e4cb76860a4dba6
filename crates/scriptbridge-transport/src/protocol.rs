//! Wire protocol between host and worker.

use scriptbridge_core::{FileToLoad, FsCommand, FsOutput, Namespace, RunContext};
use scriptbridge_executor::{CoordinatorConfig, RunOutcome};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer closed the channel")]
    Closed,
    #[error("Invalid message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Message from host to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Create the worker's coordinator. Must come first, exactly once.
    Init {
        #[serde(default)]
        config: CoordinatorConfig,
        /// Written into the guest filesystem before the worker is ready.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<FileToLoad>,
    },
    /// Run a script.
    Execute {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<Namespace>,
    },
    /// Answer the pending `input_required`.
    InputResponse { input: String },
    /// Clear session state without running anything.
    Reset,
    /// Read or change the guest filesystem.
    FsOperation {
        #[serde(flatten)]
        command: FsCommand,
    },
    /// Ping for keepalive.
    Ping,
}

impl HostMessage {
    /// Parse one text frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a known message.
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the run context of an `execute` message.
    #[must_use]
    pub fn into_context(self) -> Option<RunContext> {
        let Self::Execute {
            code,
            filename,
            namespace,
        } = self
        else {
            return None;
        };
        let mut ctx = RunContext::new(code).with_namespace(namespace.unwrap_or_default());
        if let Some(filename) = filename {
            ctx = ctx.with_filename(filename);
        }
        Some(ctx)
    }
}

/// Message from worker to host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Coordinator is initialized (or reset) and idle.
    Ready,
    /// A run finished.
    Result { outcome: RunOutcome },
    /// The running script is suspended on input.
    InputRequired { prompt: String },
    /// Error message.
    Error { message: String },
    /// Answer to an `fs_operation`.
    FsResult { result: FsOutput },
    /// A failed `fs_operation`.
    FsError { error: String },
    /// Pong response.
    Pong,
}

impl WorkerMessage {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize into one text frame.
    ///
    /// # Errors
    /// Returns error if the outcome cannot be serialized.
    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}
