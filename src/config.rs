//! Configuration loading.
//!
//! Two layers:
//! - the start configuration of a [`Context`](crate::Context) (buckets,
//!   triggers, execution options), read from TOML;
//! - process settings for the binary, read from `BATCH_BUCKETS_*` environment
//!   variables. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `BATCH_BUCKETS_CONFIG` | unset | Path of the TOML start configuration |
//! | `BATCH_BUCKETS_LOG_LEVEL` | info | `EnvFilter` directive |
//! | `BATCH_BUCKETS_LOG_FORMAT` | json | `json` or `pretty` |
//! | `BATCH_BUCKETS_LOG_FILE` | unset | Log file (stderr when unset) |
//! | `BATCH_BUCKETS_DEMO_TASKS` | 10 | Tasks enqueued by `demo` (min 1) |

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::scheduler::ContextConfig;
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_DEMO_TASKS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parse a start configuration from TOML.
///
/// ```toml
/// [execution-options]
/// parallel = true
///
/// [buckets.default.triggers.queue-size]
/// threshold = 3
///
/// [buckets.users.triggers.interval]
/// interval = 50
/// ```
pub fn parse_toml<C>(source: &str) -> Result<ContextConfig<C>, ConfigError> {
    Ok(toml::from_str(source)?)
}

/// Read and parse a TOML start configuration file.
pub fn load_file<C>(path: impl AsRef<Path>) -> Result<ContextConfig<C>, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&source)
}

/// Process settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub log: LogConfig,
    pub demo_tasks: usize,
}

/// Serializable summary of the effective settings.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config_path: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<String>,
    pub demo_tasks: usize,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Non-empty env var as a path.
fn parse_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("BATCH_BUCKETS_LOG_LEVEL")
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = std::env::var("BATCH_BUCKETS_LOG_FORMAT")
        .ok()
        .and_then(|val| val.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format);
    LogConfig {
        format,
        level,
        output_path: parse_path("BATCH_BUCKETS_LOG_FILE"),
    }
}

/// Load all process settings from environment variables.
pub fn load_env() -> EnvConfig {
    let demo_tasks = parse_usize("BATCH_BUCKETS_DEMO_TASKS", DEFAULT_DEMO_TASKS).max(1);
    EnvConfig {
        config_path: parse_path("BATCH_BUCKETS_CONFIG"),
        log: load_log_config(),
        demo_tasks,
    }
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            config_path: self.config_path.as_ref().map(|p| p.display().to_string()),
            log_level: self.log.level.clone(),
            log_format: self.log.format,
            log_file: self.log.output_path.as_ref().map(|p| p.display().to_string()),
            demo_tasks: self.demo_tasks,
        }
    }

    /// Start configuration from `config_path`, or an empty one (default
    /// bucket only) when unset.
    pub fn context_config<C>(&self) -> Result<ContextConfig<C>, ConfigError> {
        match &self.config_path {
            Some(path) => load_file(path),
            None => Ok(ContextConfig::new()),
        }
    }
}
