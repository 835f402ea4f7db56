//! Engine Configuration
//!
//! Loads engine settings from a YAML file. Every field is optional in the
//! file; missing fields take their defaults.
//!
//! ```yaml
//! strict: true
//! log_level: debug
//! state_dir: .flowline
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Default directory for persisted payloads.
pub const DEFAULT_STATE_DIR: &str = ".flowline";

/// Settings shared by the engine and the command line host.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Treat every step failure as fatal
    pub strict: bool,

    /// Default `env_logger` filter
    pub log_level: String,

    /// Where the command line host keeps payload files
    pub state_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict: false,
            log_level: "info".to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

/// Loads configuration from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use flowline::load_config;
///
/// fn main() -> Result<(), flowline::FlowError> {
///     let config = load_config("flowline.yaml")?;
///     println!("strict: {}", config.strict);
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, FlowError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        FlowError::Config(format!(
            "Failed to read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!("Configuration loaded ({} bytes)", content.len());
    parse_config(&content)
}

/// Parses configuration from YAML text. Empty text gives the defaults.
pub fn parse_config(content: &str) -> Result<EngineConfig, FlowError> {
    if content.trim().is_empty() {
        return Ok(EngineConfig::default());
    }

    serde_yaml::from_str(content)
        .map_err(|e| FlowError::Config(format!("Failed to parse configuration YAML: {}", e)))
}
