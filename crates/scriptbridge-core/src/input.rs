//! Interactive input as a host-answered suspension point.
//!
//! The guest side ([`InputPort`]) posts an [`InputRequest`] and awaits its
//! reply; the host side ([`InputRequests`]) receives requests from its own
//! message loop and answers each one through the request itself, so a reply
//! can only ever resume the request it was meant for.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::GuestException;

/// Input error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("no host is attached to answer input requests")]
    NoHost,
    #[error("input request {0} was abandoned by the host")]
    Abandoned(u64),
    #[error("input was refused: {0}")]
    Refused(String),
}

/// Guests see every failed input call as end-of-input.
impl From<InputError> for GuestException {
    fn from(err: InputError) -> Self {
        Self::new("EOFError", err.to_string())
    }
}

/// A pending request for one line of input.
#[derive(Debug)]
pub struct InputRequest {
    id: u64,
    prompt: String,
    reply: oneshot::Sender<Result<String, InputError>>,
}

impl InputRequest {
    /// Sequence number, unique per port.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Prompt the guest passed to its input call.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Resume the waiting guest with `value`.
    ///
    /// # Errors
    /// Returns [`InputError::Abandoned`] if the run already ended.
    pub fn respond(self, value: impl Into<String>) -> Result<(), InputError> {
        let id = self.id;
        self.reply
            .send(Ok(value.into()))
            .map_err(|_| InputError::Abandoned(id))
    }

    /// Fail the waiting input call.
    ///
    /// # Errors
    /// Returns [`InputError::Abandoned`] if the run already ended.
    pub fn refuse(self, reason: impl Into<String>) -> Result<(), InputError> {
        let id = self.id;
        self.reply
            .send(Err(InputError::Refused(reason.into())))
            .map_err(|_| InputError::Abandoned(id))
    }
}

/// Guest-side sender of input requests.
#[derive(Debug, Clone)]
pub struct InputPort {
    tx: Option<mpsc::UnboundedSender<InputRequest>>,
    next_id: Arc<AtomicU64>,
}

impl InputPort {
    /// A port with no host behind it; every request fails with
    /// [`InputError::NoHost`].
    #[must_use]
    pub fn detached() -> Self {
        Self {
            tx: None,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a host side is still listening.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Ask the host for a line of input and wait for the reply.
    ///
    /// # Errors
    /// Fails if no host is listening, the host drops the request, or the
    /// host refuses it.
    pub async fn request(&self, prompt: &str) -> Result<String, InputError> {
        let tx = self.tx.as_ref().ok_or(InputError::NoHost)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        tx.send(InputRequest {
            id,
            prompt: prompt.to_string(),
            reply,
        })
        .map_err(|_| InputError::NoHost)?;

        tracing::debug!(id, "waiting for host input");
        rx.await.map_err(|_| InputError::Abandoned(id))?
    }
}

/// Host-side receiver of input requests.
#[derive(Debug)]
pub struct InputRequests {
    rx: mpsc::UnboundedReceiver<InputRequest>,
}

impl InputRequests {
    /// Next request, or `None` once every port is gone.
    pub async fn next(&mut self) -> Option<InputRequest> {
        self.rx.recv().await
    }

    /// Next request if one is already queued.
    pub fn try_next(&mut self) -> Option<InputRequest> {
        self.rx.try_recv().ok()
    }

    /// Consume into a `Stream` of requests.
    #[must_use]
    pub fn into_stream(self) -> UnboundedReceiverStream<InputRequest> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Create a connected port/receiver pair.
#[must_use]
pub fn input_channel() -> (InputPort, InputRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        InputPort {
            tx: Some(tx),
            next_id: Arc::new(AtomicU64::new(0)),
        },
        InputRequests { rx },
    )
}
