//! Run context handed to the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Globals seeded into the guest's scope before a run.
pub type Namespace = Map<String, Value>;

/// Everything the host supplies for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    /// Guest source text.
    pub source: String,

    /// Name used in logs and echoed back in the outcome.
    #[serde(default)]
    pub filename: Option<String>,

    /// Optional globals for the guest's scope.
    #[serde(default)]
    pub namespace: Namespace,
}

impl RunContext {
    /// Create a context with just source text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            filename: None,
            namespace: Namespace::new(),
        }
    }

    /// Set the filename.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Replace the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Get a global by name.
    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&Value> {
        self.namespace.get(key)
    }

    /// Set a global.
    pub fn set_global(&mut self, key: impl Into<String>, value: Value) {
        self.namespace.insert(key.into(), value);
    }
}
