//! Visual artifacts produced incidentally during a run.

pub mod canvas;
pub mod extractors;

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use canvas::{Canvas, CanvasHandle};
pub use extractors::CanvasExtractor;

use crate::{error::BridgeError, traits::ArtifactExtractor};

/// Artifact kind for base64-encoded PNG rasters.
pub const PNG_KIND: &str = "image/png";
/// Artifact kind for structured scene descriptions.
pub const SCENE_KIND: &str = "scene/json";

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A serialized artifact ready for transport to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: String,
    pub payload: String,
}

/// Raw artifact as held by a plotting façade.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactSource {
    /// Encoded PNG bytes.
    Raster(Vec<u8>),
    /// Scene description; must be a JSON object.
    Scene(Value),
}

impl ArtifactSource {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Raster(_) => PNG_KIND,
            Self::Scene(_) => SCENE_KIND,
        }
    }

    /// Encode into the transport form.
    ///
    /// # Errors
    /// Fails if the raster is not a PNG or the scene is not a JSON object.
    pub fn to_artifact(&self) -> Result<Artifact, ArtifactError> {
        let payload = match self {
            Self::Raster(bytes) => {
                if !bytes.starts_with(&PNG_SIGNATURE) {
                    return Err(ArtifactError::NotPng(bytes.len()));
                }
                BASE64.encode(bytes)
            }
            Self::Scene(Value::Object(map)) => serde_json::to_string(map)?,
            Self::Scene(other) => return Err(ArtifactError::SceneNotObject(json_type(other))),
        };
        Ok(Artifact {
            kind: self.kind().to_string(),
            payload,
        })
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Artifact extraction error.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("raster of {0} bytes is not a PNG image")]
    NotPng(usize),
    #[error("scene description must be a JSON object, got {0}")]
    SceneNotObject(&'static str),
    #[error("scene description could not be encoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plotting facade is no longer present")]
    FacadeGone,
    #[error("plotting facade state is poisoned")]
    Poisoned,
    #[error("{0}")]
    Panicked(String),
}

/// Artifacts and recovered failures from one extraction pass.
#[derive(Debug, Default)]
pub struct Extraction {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<BridgeError>,
}

/// Ordered collection of extractors.
///
/// Extractors run in registration order. Unavailable ones are skipped and a
/// failing one contributes nothing; neither blocks the rest.
#[derive(Default)]
pub struct ExtractorSet {
    extractors: Vec<Box<dyn ArtifactExtractor>>,
}

impl ExtractorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor at the end of the run order.
    pub fn push(&mut self, extractor: Box<dyn ArtifactExtractor>) {
        self.extractors.push(extractor);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Discard pending façade state so nothing leaks into the next run.
    pub fn reset_all(&mut self) {
        for extractor in self.extractors.iter_mut().filter(|e| e.available()) {
            match catch_unwind(AssertUnwindSafe(|| extractor.reset())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(extractor = extractor.name(), "reset skipped: {e}"),
                Err(payload) => tracing::warn!(
                    extractor = extractor.name(),
                    "extractor panicked during reset: {}",
                    panic_text(payload.as_ref())
                ),
            }
        }
    }

    /// Run every available extractor once.
    ///
    /// A failing source, a failing extractor and a panicking extractor each
    /// become one entry in [`Extraction::failures`].
    pub fn extract_all(&mut self) -> Extraction {
        let mut extraction = Extraction::default();
        for extractor in &mut self.extractors {
            if !extractor.available() {
                tracing::debug!(extractor = extractor.name(), "extractor unavailable, skipping");
                continue;
            }
            let results = match catch_unwind(AssertUnwindSafe(|| extractor.extract())) {
                Ok(results) => results,
                Err(payload) => {
                    let message = format!("extractor panicked: {}", panic_text(payload.as_ref()));
                    vec![Err(ArtifactError::Panicked(message))]
                }
            };
            for result in results {
                match result {
                    Ok(artifact) => extraction.artifacts.push(artifact),
                    Err(e) => {
                        tracing::warn!(extractor = extractor.name(), "artifact extraction failed: {e}");
                        extraction.failures.push(BridgeError::ArtifactExtraction {
                            extractor: extractor.name().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        extraction
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl FromIterator<Box<dyn ArtifactExtractor>> for ExtractorSet {
    fn from_iter<I: IntoIterator<Item = Box<dyn ArtifactExtractor>>>(iter: I) -> Self {
        Self {
            extractors: iter.into_iter().collect(),
        }
    }
}
