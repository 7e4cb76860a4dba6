//! Shared state of a plotting façade.
//!
//! The interpreter owns a [`Canvas`] and pushes sources into it as guest code
//! draws. Extractors only hold a weak [`CanvasHandle`], so once the façade is
//! torn down they report themselves unavailable.

use std::sync::{Arc, Mutex, Weak};

use super::{ArtifactError, ArtifactSource};

type Sources = Mutex<Vec<ArtifactSource>>;

/// Façade-side owner of pending artifact sources.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    inner: Arc<Sources>,
}

impl Canvas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a produced source, in production order.
    pub fn push(&self, source: ArtifactSource) {
        match self.inner.lock() {
            Ok(mut sources) => sources.push(source),
            Err(_) => tracing::warn!("canvas lock poisoned, dropping artifact"),
        }
    }

    /// Number of pending sources of `kind`.
    #[must_use]
    pub fn pending(&self, kind: &str) -> usize {
        self.inner
            .lock()
            .map(|s| s.iter().filter(|src| src.kind() == kind).count())
            .unwrap_or(0)
    }

    /// Weak handle for extractors.
    #[must_use]
    pub fn handle(&self) -> CanvasHandle {
        CanvasHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Extractor-side view of a [`Canvas`].
#[derive(Debug, Clone)]
pub struct CanvasHandle {
    inner: Weak<Sources>,
}

impl CanvasHandle {
    /// Whether the owning façade still exists.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Take every pending source of `kind` out of the façade, keeping the
    /// rest. Removal happens under one lock, so a source pushed concurrently
    /// is either returned or left pending.
    ///
    /// # Errors
    /// Fails if the façade is gone or its lock is poisoned.
    pub fn drain(&self, kind: &str) -> Result<Vec<ArtifactSource>, ArtifactError> {
        let inner = self.inner.upgrade().ok_or(ArtifactError::FacadeGone)?;
        let mut sources = inner.lock().map_err(|_| ArtifactError::Poisoned)?;
        let (taken, kept) = std::mem::take(&mut *sources)
            .into_iter()
            .partition(|s| s.kind() == kind);
        *sources = kept;
        Ok(taken)
    }

    /// Remove pending sources of `kind`, keeping the rest.
    ///
    /// # Errors
    /// Fails if the façade is gone or its lock is poisoned.
    pub fn clear(&self, kind: &str) -> Result<usize, ArtifactError> {
        let inner = self.inner.upgrade().ok_or(ArtifactError::FacadeGone)?;
        let mut sources = inner.lock().map_err(|_| ArtifactError::Poisoned)?;
        let before = sources.len();
        sources.retain(|s| s.kind() != kind);
        Ok(before - sources.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::artifact::{PNG_KIND, SCENE_KIND};

    #[test]
    fn test_clear_only_touches_one_kind() {
        let canvas = Canvas::new();
        canvas.push(ArtifactSource::Raster(vec![1]));
        canvas.push(ArtifactSource::Scene(json!({})));
        canvas.push(ArtifactSource::Raster(vec![2]));

        let handle = canvas.handle();
        assert_eq!(handle.clear(PNG_KIND).unwrap(), 2);
        assert_eq!(canvas.pending(PNG_KIND), 0);
        assert_eq!(canvas.pending(SCENE_KIND), 1);
    }

    #[test]
    fn test_drain_takes_one_kind_in_order() {
        let canvas = Canvas::new();
        canvas.push(ArtifactSource::Raster(vec![1]));
        canvas.push(ArtifactSource::Scene(json!({})));
        canvas.push(ArtifactSource::Raster(vec![2]));

        let taken = canvas.handle().drain(PNG_KIND).unwrap();
        assert_eq!(
            taken,
            vec![ArtifactSource::Raster(vec![1]), ArtifactSource::Raster(vec![2])]
        );
        assert_eq!(canvas.pending(PNG_KIND), 0);
        assert_eq!(canvas.pending(SCENE_KIND), 1);
    }

    #[test]
    fn test_handle_dies_with_canvas() {
        let canvas = Canvas::new();
        let handle = canvas.handle();
        assert!(handle.is_live());
        drop(canvas);
        assert!(!handle.is_live());
        assert!(matches!(handle.drain(PNG_KIND), Err(ArtifactError::FacadeGone)));
    }
}
