//! WebSocket transport: one worker per connection.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use scriptbridge_session::InterpreterFactory;
use tokio::sync::mpsc;

use crate::{
    protocol::{HostMessage, WorkerMessage},
    worker::Worker,
};

/// WebSocket handler state.
pub struct WsState<F> {
    /// Builds the interpreter of every new connection.
    pub factory: Arc<F>,
}

impl<F> Clone for WsState<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<F> WsState<F> {
    #[must_use]
    pub const fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<F>(ws: WebSocketUpgrade, State(state): State<WsState<F>>) -> impl IntoResponse
where
    F: InterpreterFactory + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<F>(socket: WebSocket, state: WsState<F>)
where
    F: InterpreterFactory + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<HostMessage>();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let worker = tokio::spawn(Worker::new(state.factory).serve(inbox_rx, outbox_tx.clone()));

    // Forward worker messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            let json = match msg.encode() {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        match HostMessage::decode(&text) {
            Ok(msg) => {
                if inbox_tx.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Invalid host message: {e}");
                let _ = outbox_tx.send(WorkerMessage::error(e.to_string()));
            }
        }
    }

    // Closing the inbox lets a suspended run finish with end-of-input.
    drop(inbox_tx);
    drop(outbox_tx);
    match worker.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("worker stopped: {e}"),
        Err(e) => tracing::error!("worker task failed: {e}"),
    }
    send_task.abort();
}

/// Create WebSocket router serving `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(Arc::new(factory)));
/// ```
#[must_use]
pub fn create_ws_router<F>(factory: Arc<F>) -> axum::Router
where
    F: InterpreterFactory + 'static,
{
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<F>))
        .with_state(WsState::new(factory))
}
