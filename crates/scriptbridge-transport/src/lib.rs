//! Transport layer between a host and a bridge worker.
//!
//! Provides:
//! - Wire protocol (tagged JSON messages)
//! - `Worker` - the single-task message loop around one coordinator
//! - WebSocket transport (feature: websocket)

pub mod protocol;
pub mod worker;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{HostMessage, TransportError, WorkerMessage};
pub use worker::Worker;
