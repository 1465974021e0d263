//! Save pipeline configuration.
//!
//! # Invariants
//! - Unknown configuration keys are rejected, not ignored.
//! - Missing keys fall back to `SavePipelineConfig::default()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tunables for `SavePipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SavePipelineConfig {
    /// Run managed saves of the same identifier one at a time within this
    /// process.
    pub serialize_per_identifier: bool,
}

impl Default for SavePipelineConfig {
    fn default() -> Self {
        Self {
            serialize_per_identifier: true,
        }
    }
}

impl SavePipelineConfig {
    /// Parses configuration from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        serde_json::from_str(raw).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Empty,
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "save pipeline config must not be empty"),
            Self::Invalid(message) => write!(f, "invalid save pipeline config: {message}"),
        }
    }
}

impl Error for ConfigError {}
