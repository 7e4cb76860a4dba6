//! Error taxonomy shared by every bridge component.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Faults raised by the bridge itself rather than by guest logic.
///
/// The `Display` form is the bare message; [`BridgeError::kind`] names the
/// category, and [`BridgeError::summary`] joins both into the one-line form
/// written to the error buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A second result was sent in the same session.
    #[error("{0}")]
    ProtocolViolation(String),
    /// The stored result has no wire representation.
    #[error("{0}")]
    SerializationFailure(String),
    /// Source text defeated the input rewrite.
    #[error("{0}")]
    RewriteFailure(String),
    /// One artifact extractor failed.
    #[error("{extractor}: {message}")]
    ArtifactExtraction { extractor: String, message: String },
}

impl BridgeError {
    /// Category name, as it appears in stderr summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProtocolViolation(_) => "ProtocolViolation",
            Self::SerializationFailure(_) => "SerializationFailure",
            Self::RewriteFailure(_) => "RewriteFailure",
            Self::ArtifactExtraction { .. } => "ArtifactExtractionFailure",
        }
    }

    /// One-line `kind: message` summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}

/// An exception raised inside guest code.
///
/// Interpreters translate their native exception objects into this shape;
/// the coordinator records it as a `GuestRuntimeError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestException {
    /// Exception type name, e.g. `ValueError`.
    pub kind: String,
    /// Exception message; may be empty.
    pub message: String,
}

impl GuestException {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GuestException {}

impl From<BridgeError> for GuestException {
    fn from(err: BridgeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let err = BridgeError::RewriteFailure("tab in indentation on line 3".into());
        assert_eq!(err.summary(), "RewriteFailure: tab in indentation on line 3");

        let err = BridgeError::ArtifactExtraction {
            extractor: "raster".into(),
            message: "boom".into(),
        };
        assert_eq!(err.summary(), "ArtifactExtractionFailure: raster: boom");
    }

    #[test]
    fn test_guest_exception_from_bridge_error() {
        let exc = GuestException::from(BridgeError::ProtocolViolation("twice".into()));
        assert_eq!(exc.kind, "ProtocolViolation");
        assert_eq!(exc.to_string(), "ProtocolViolation: twice");
    }
}
