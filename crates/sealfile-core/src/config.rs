use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::{SealError, SealResult};

/// Top-level configuration (loaded from sealfile.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

/// Password key-derivation cost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id profile: "interactive", "moderate" or "sensitive" (default: interactive)
    pub profile: String,
    /// Override the profile's memory cost in KiB
    pub argon2_mem_cost_kib: Option<u32>,
    /// Override the profile's time cost (passes)
    pub argon2_time_cost: Option<u32>,
    /// Override the profile's parallelism
    pub argon2_parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension appended to encrypted containers (default: sealed)
    pub container_extension: String,
    /// Suffix of the side-channel record written next to a container (default: seal.json)
    pub record_suffix: String,
    /// Replace existing output files
    pub overwrite: bool,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            profile: "interactive".into(),
            argon2_mem_cost_kib: None,
            argon2_time_cost: None,
            argon2_parallelism: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            container_extension: "sealed".into(),
            record_suffix: "seal.json".into(),
            overwrite: false,
        }
    }
}

impl SealConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> SealResult<Self> {
        let config: SealConfig =
            toml::from_str(content).map_err(|e| SealError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or `None` when the file does not exist.
    ///
    /// Emits no log events, so it can run before a subscriber is installed.
    pub fn load_if_present(path: &Path) -> SealResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|e| SealError::Config(format!("{}: {e}", path.display())))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> SealResult<Self> {
        match Self::load_if_present(path)? {
            Some(config) => Ok(config),
            None => {
                warn_missing(path);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> SealResult<()> {
        match self.crypto.profile.to_ascii_lowercase().as_str() {
            "interactive" | "moderate" | "sensitive" => {}
            other => {
                return Err(SealError::Config(format!(
                    "crypto.profile: unknown profile {other:?}"
                )))
            }
        }
        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(SealError::Config(format!(
                    "logging.format: expected \"json\" or \"text\", got {other:?}"
                )))
            }
        }
        if self.output.container_extension.is_empty() || self.output.record_suffix.is_empty() {
            return Err(SealError::Config(
                "output.container_extension and output.record_suffix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Log that `path` was absent and defaults are in effect.
pub fn warn_missing(path: &Path) {
    warn!("config file not found: {}  (using defaults)", path.display());
}
