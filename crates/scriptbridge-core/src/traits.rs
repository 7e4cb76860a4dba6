//! Core traits for interpreters and artifact extractors.

use async_trait::async_trait;

use crate::{
    artifact::{Artifact, ArtifactError},
    context::Namespace,
    error::GuestException,
    fs::GuestFs,
    host::GuestHost,
};

/// The external script-execution environment.
///
/// Implementations run (possibly rewritten) source text and bind the guest's
/// ambient callables to `host`: standard output/error writes, `send_result`,
/// an awaitable `input`, and `report_exception`.
#[async_trait]
pub trait Interpreter: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Execute `source` with `globals` seeded into its scope.
    ///
    /// # Errors
    /// Returns the guest exception that escaped the script, if any.
    async fn execute(
        &mut self,
        source: &str,
        globals: &Namespace,
        host: &mut GuestHost<'_>,
    ) -> Result<(), GuestException>;

    /// The filesystem guest code sees, if the interpreter has one.
    fn filesystem(&mut self) -> Option<&mut dyn GuestFs> {
        None
    }
}

/// Pulls produced artifacts out of one façade.
///
/// Implement this trait to report visual output from a plotting or graphics
/// library the interpreter exposes.
pub trait ArtifactExtractor: Send {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Cheap check that the target façade exists in this environment.
    fn available(&self) -> bool;

    /// Discard pending façade state before a run.
    ///
    /// # Errors
    /// Returns error if the façade state cannot be reached.
    fn reset(&mut self) -> Result<(), ArtifactError>;

    /// Collect and clear artifacts produced since the last reset, in
    /// production order.
    ///
    /// An `Err` element stands for one source that could not be encoded, or
    /// for the whole façade when its state cannot be reached. The `Ok`
    /// elements are delivered either way.
    fn extract(&mut self) -> Vec<Result<Artifact, ArtifactError>>;
}
