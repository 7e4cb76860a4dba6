//! Per-run session state.

use crate::{
    artifact::Artifact,
    capture::{CapturedOutput, Channel, StreamCapture},
    error::GuestException,
    missive::ResultChannel,
};

/// State for one run: capture buffers, result slot, the first guest failure
/// and extracted artifacts.
///
/// Owned by exactly one coordinator and reset before every run, so nothing
/// from a previous run (however it ended) is observable in the next.
#[derive(Debug, Default)]
pub struct ExecutionSession {
    capture: StreamCapture,
    missive: ResultChannel,
    failure: Option<GuestException>,
    artifacts: Vec<Artifact>,
}

impl ExecutionSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session whose capture holds at most `limit` characters per channel.
    #[must_use]
    pub fn with_capture_limit(limit: Option<usize>) -> Self {
        Self {
            capture: StreamCapture::with_limit(limit),
            ..Self::default()
        }
    }

    /// Clear buffers, result slot, failure and artifacts.
    pub fn reset(&mut self) {
        self.capture.reset();
        self.missive.reset();
        self.failure = None;
        self.artifacts.clear();
    }

    /// Write a `kind: message` line to stderr and remember the first failure.
    pub fn record_failure(&mut self, exc: GuestException) {
        self.capture.write(Channel::Stderr, &format!("{exc}\n"));
        if self.failure.is_none() {
            self.failure = Some(exc);
        }
    }

    /// First guest failure of this run, caught or not.
    #[must_use]
    pub const fn failure(&self) -> Option<&GuestException> {
        self.failure.as_ref()
    }

    #[must_use]
    pub const fn capture(&self) -> &StreamCapture {
        &self.capture
    }

    pub const fn capture_mut(&mut self) -> &mut StreamCapture {
        &mut self.capture
    }

    #[must_use]
    pub const fn missive(&self) -> &ResultChannel {
        &self.missive
    }

    pub const fn missive_mut(&mut self) -> &mut ResultChannel {
        &mut self.missive
    }

    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Append extracted artifacts.
    pub fn extend_artifacts(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        self.artifacts.extend(artifacts);
    }

    /// Snapshot of both capture buffers.
    #[must_use]
    pub fn output(&self) -> CapturedOutput {
        self.capture.snapshot()
    }
}
