//! Core abstractions for running guest scripts behind an execution bridge.
//!
//! This crate provides the per-run building blocks:
//! - `StreamCapture` - stdout/stderr capture buffers
//! - `ResultChannel` - the one-shot structured result ("missive")
//! - `ExtractorSet` - pluggable artifact extraction
//! - `InputPort` / `InputRequests` - host-answered interactive input
//! - `ExecutionSession` and `GuestHost` - per-run state and the guest call surface
//! - `GuestFs` and `MemoryFs` - the guest's virtual filesystem
//! - `Interpreter` and `ArtifactExtractor` traits

pub mod artifact;
pub mod capture;
pub mod context;
pub mod error;
pub mod fs;
pub mod host;
pub mod input;
pub mod missive;
pub mod session;
pub mod traits;
pub mod value;

pub use artifact::{Artifact, ArtifactError, ArtifactSource, Canvas, CanvasExtractor, ExtractorSet};
pub use capture::{CapturedOutput, Channel, StreamCapture};
pub use context::{Namespace, RunContext};
pub use error::{BridgeError, GuestException};
pub use fs::{FileToLoad, FsCommand, FsError, FsOp, FsOutput, GuestFs, MemoryFs};
pub use host::GuestHost;
pub use input::{InputError, InputPort, InputRequest, InputRequests, input_channel};
pub use missive::ResultChannel;
pub use session::ExecutionSession;
pub use traits::{ArtifactExtractor, Interpreter};
pub use value::GuestValue;
