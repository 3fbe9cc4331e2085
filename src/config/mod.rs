//! Engine configuration.
//!
//! Settings are read from a JSON or TOML file, chosen by extension. A missing
//! or broken file falls back to defaults with a warning; the engine never
//! refuses to start over configuration.
//!
//! # Config Location
//!
//! - **Linux**: `~/.config/dev.procflow/engine.toml`
//! - **macOS**: `~/Library/Application Support/dev.procflow/engine.toml`
//! - **Windows**: `%APPDATA%\dev.procflow\engine.toml`
//!
//! # Example
//!
//! ```ignore
//! use procflow::config::EngineConfig;
//!
//! let config = EngineConfig::load_or_default(EngineConfig::default_path());
//! let network = ProcessorNetwork::from_config(&config);
//! ```

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.procflow";

/// Default config filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Worker threads when nothing is configured
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default wait for async completions in milliseconds
pub const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 5_000;

/// Path of the default config file, if the platform has a config directory.
pub fn default_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(FlowError::Config(format!(
                "Unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

// ==================== Engine Config ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Version for future migration support
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            evaluation: EvaluationConfig::default(),
            workers: WorkerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`. The extension picks the format.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::of(path)?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| FlowError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| FlowError::Config(format!("Failed to parse {}: {}", path.display(), e))),
            Format::Toml => toml::from_str(&content)
                .map_err(|e| FlowError::Config(format!("Failed to parse {}: {}", path.display(), e))),
        }
    }

    /// Load from `path`, returning defaults when there is no path, no file,
    /// or the file does not parse.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No engine config at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| FlowError::Serialization(e.to_string()))?,
            Format::Toml => {
                toml::to_string_pretty(self).map_err(|e| FlowError::Serialization(e.to_string()))?
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| FlowError::Config(format!("Failed to write {}: {}", path.display(), e)))
    }
}

// ==================== Sections ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Turn panics inside `process()` into processor faults.
    pub catch_panics: bool,

    /// Upper bound for `wait_for_completions` when no timeout is given.
    pub completion_timeout_ms: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            completion_timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Threads available to asynchronous processors.
    pub threads: usize,

    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_WORKER_THREADS,
            thread_name: "procflow-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive. `RUST_LOG` wins when set.
    pub filter: String,

    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,procflow=debug".to_string(),
            log_file: None,
        }
    }
}
