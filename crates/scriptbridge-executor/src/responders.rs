//! Answering guest input requests.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use scriptbridge_core::InputError;

/// Trait for answering guest `input(prompt)` calls.
///
/// Implement this trait to connect input to a terminal, a UI or a remote
/// peer. The coordinator provides the suspension; the host provides lines.
#[async_trait]
pub trait InputResponder: Send + Sync {
    /// Produce the line the guest's input call returns.
    ///
    /// # Errors
    /// An error is raised in the guest as end-of-input.
    async fn respond(&self, prompt: &str) -> Result<String, InputError>;
}

/// Responder that refuses every request.
#[derive(Debug, Default, Clone)]
pub struct NoInput;

#[async_trait]
impl InputResponder for NoInput {
    async fn respond(&self, _prompt: &str) -> Result<String, InputError> {
        Err(InputError::Refused("no input available".into()))
    }
}

/// Responder that hands out pre-recorded lines in order.
#[derive(Debug, Default)]
pub struct QueuedInput {
    lines: Mutex<VecDeque<String>>,
}

impl QueuedInput {
    #[must_use]
    pub fn new<I>(lines: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }

    /// Queue another line.
    pub fn push(&self, line: impl Into<String>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push_back(line.into());
        }
    }

    /// Lines not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lines.lock().map_or(0, |lines| lines.len())
    }
}

#[async_trait]
impl InputResponder for QueuedInput {
    async fn respond(&self, _prompt: &str) -> Result<String, InputError> {
        self.lines
            .lock()
            .ok()
            .and_then(|mut lines| lines.pop_front())
            .ok_or_else(|| InputError::Refused("input queue exhausted".into()))
    }
}

/// Responder backed by a closure over the prompt.
pub struct FnResponder<F>(F);

impl<F> FnResponder<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> InputResponder for FnResponder<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn respond(&self, prompt: &str) -> Result<String, InputError> {
        (self.0)(prompt).ok_or_else(|| InputError::Refused(format!("no answer for {prompt:?}")))
    }
}
