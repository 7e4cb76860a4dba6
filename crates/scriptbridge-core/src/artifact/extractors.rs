//! Built-in extractors over a [`Canvas`](super::Canvas).

use super::{Artifact, ArtifactError, ArtifactSource, CanvasHandle, PNG_KIND, SCENE_KIND};
use crate::traits::ArtifactExtractor;

/// Pulls one kind of source out of a plotting façade.
///
/// Each pass drains the façade's sources of its kind and encodes them one by
/// one, so a source that fails to encode does not take the others with it.
#[derive(Debug, Clone)]
pub struct CanvasExtractor {
    name: &'static str,
    kind: &'static str,
    canvas: CanvasHandle,
}

impl CanvasExtractor {
    /// Raster figures, reported as base64 PNG.
    #[must_use]
    pub const fn raster(canvas: CanvasHandle) -> Self {
        Self {
            name: "raster",
            kind: PNG_KIND,
            canvas,
        }
    }

    /// Structured scene descriptions, reported as JSON.
    #[must_use]
    pub const fn scene(canvas: CanvasHandle) -> Self {
        Self {
            name: "scene",
            kind: SCENE_KIND,
            canvas,
        }
    }
}

impl ArtifactExtractor for CanvasExtractor {
    fn name(&self) -> &str {
        self.name
    }

    fn available(&self) -> bool {
        self.canvas.is_live()
    }

    fn reset(&mut self) -> Result<(), ArtifactError> {
        let closed = self.canvas.clear(self.kind)?;
        if closed > 0 {
            tracing::debug!(kind = self.kind, closed, "closed stale artifact sources");
        }
        Ok(())
    }

    fn extract(&mut self) -> Vec<Result<Artifact, ArtifactError>> {
        match self.canvas.drain(self.kind) {
            Ok(sources) => sources.iter().map(ArtifactSource::to_artifact).collect(),
            Err(e) => vec![Err(e)],
        }
    }
}
