//! Coordinator configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rewrite::{MIN_INDENT, RewriteConfig};

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "SCRIPTBRIDGE_";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Settings for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub rewrite: RewriteConfig,
    /// Write the input prompt to captured stdout before suspending.
    pub echo_prompt: bool,
    /// Maximum characters kept per output channel; `None` is unbounded.
    pub capture_limit: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rewrite: RewriteConfig::default(),
            echo_prompt: true,
            capture_limit: None,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON for this shape or
    /// holds an out-of-range value.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        if config.rewrite.indent < MIN_INDENT {
            return Err(ConfigError::InvalidValue {
                key: "rewrite.indent".to_string(),
                value: config.rewrite.indent.to_string(),
            });
        }
        Ok(config)
    }

    /// Apply `SCRIPTBRIDGE_*` overrides from the process environment.
    ///
    /// # Errors
    /// Returns error if a recognized variable holds an unparsable value.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Apply overrides from `vars`. Unknown keys are ignored.
    ///
    /// Recognized keys: `ECHO_PROMPT`, `CAPTURE_LIMIT` (`0` or `none` clears
    /// the limit), `INPUT_CALL`, `INDENT`.
    ///
    /// # Errors
    /// Returns error if a recognized variable holds an unparsable value.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            let invalid = || ConfigError::InvalidValue {
                key: key.as_ref().to_string(),
                value: value.to_string(),
            };
            match name {
                "ECHO_PROMPT" => self.echo_prompt = parse_bool(value).ok_or_else(invalid)?,
                "CAPTURE_LIMIT" => {
                    self.capture_limit = match value {
                        "" | "0" | "none" => None,
                        n => Some(n.parse().map_err(|_| invalid())?),
                    };
                }
                "INPUT_CALL" if !value.is_empty() => self.rewrite.call_name = value.to_string(),
                "INDENT" => {
                    self.rewrite.indent = value
                        .parse()
                        .ok()
                        .filter(|&n| n >= MIN_INDENT)
                        .ok_or_else(invalid)?;
                }
                _ => {
                    tracing::debug!(key = key.as_ref(), "ignoring unknown setting");
                }
            }
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
