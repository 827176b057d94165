//! Run configuration - optional JSON file
//!
//! ```json
//! { "extrusion_match": "strict", "prompt": "single" }
//! ```
//!
//! Missing keys take their defaults; command-line flags win over the file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pattern::ExtrusionMatch;
use crate::select::PromptKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangeConfig {
    /// How the first extruding move after a marker is recognised
    pub extrusion_match: ExtrusionMatch,

    /// Interactive picker used when no heights are given
    pub prompt: PromptKind,
}

impl ChangeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }
}
