//! Source rewriting and run coordination for guest scripts.
//!
//! Provides:
//! - `SourceRewriter` - makes blocking input calls awaitable
//! - `Coordinator` - drives one session through the run lifecycle
//! - `InputResponder` implementations for answering input
//! - `CoordinatorConfig` with environment overrides

pub mod config;
pub mod coordinator;
pub mod responders;
pub mod rewrite;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{Coordinator, Phase, RunOutcome};
pub use responders::{FnResponder, InputResponder, NoInput, QueuedInput};
pub use rewrite::{RewriteConfig, RewriteError, RewriteResult, SourceRewriter, rewrite};
