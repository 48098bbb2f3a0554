//! Runtime configuration.

use crate::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Configuration knobs for ingestion, sessions and turns.
///
/// Loaded from an optional TOML file, then overridden by `SWITCHBOARD_*`
/// environment variables. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Quiet period before a key's pending batch is flushed.
    pub debounce_ms: u64,
    /// Upper bound on agent turns running at the same time.
    pub max_concurrent_turns: usize,
    /// Messages retained per session; older ones are evicted first.
    pub max_history_messages: usize,
    /// Model calls allowed in a single turn before the loop stops.
    pub max_iterations: usize,
    /// A batch that reaches this size is flushed without waiting for quiet.
    pub max_batch_items: usize,
    /// Directory holding the agent profile and markdown memory files.
    pub context_dir: PathBuf,
    /// When set, session histories are persisted here as JSON.
    pub history_dir: Option<PathBuf>,
    /// Model used when the agent profile does not name one.
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_concurrent_turns: 5,
            max_history_messages: 30,
            max_iterations: 10,
            max_batch_items: 50,
            context_dir: PathBuf::from("./context"),
            history_dir: None,
            model: "anthropic/claude-sonnet-4".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file if given, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SWITCHBOARD_*` overrides using the given variable lookup.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("DEBOUNCE_MS") {
            self.debounce_ms = parse_env("DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = var("MAX_CONCURRENT_TURNS") {
            self.max_concurrent_turns = parse_env("MAX_CONCURRENT_TURNS", &value)?;
        }
        if let Some(value) = var("MAX_HISTORY_MESSAGES") {
            self.max_history_messages = parse_env("MAX_HISTORY_MESSAGES", &value)?;
        }
        if let Some(value) = var("MAX_ITERATIONS") {
            self.max_iterations = parse_env("MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = var("MAX_BATCH_ITEMS") {
            self.max_batch_items = parse_env("MAX_BATCH_ITEMS", &value)?;
        }
        if let Some(value) = var("CONTEXT_DIR") {
            self.context_dir = PathBuf::from(value);
        }
        if let Some(value) = var("HISTORY_DIR") {
            self.history_dir = (!value.trim().is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = var("MODEL") {
            self.model = value;
        }

        Ok(())
    }

    /// Reject settings that would make the runtime unable to do any work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".into()));
        }
        if self.max_history_messages == 0 {
            return Err(ConfigError::Invalid(
                "max_history_messages must be at least 1".into(),
            ));
        }
        if self.max_batch_items == 0 {
            return Err(ConfigError::Invalid("max_batch_items must be at least 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Capacity of the turn semaphore. Zero is treated as one.
    pub fn turn_capacity(&self) -> usize {
        self.max_concurrent_turns.max(1)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}
