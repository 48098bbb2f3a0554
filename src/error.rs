//! Top-level error types.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for everything that crosses a module boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the turn machinery itself.
///
/// Only `ModelCall` is expected to surface from a turn; tool failures are
/// folded into error tool results and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model call to {model} failed: {source}")]
    ModelCall {
        model: String,
        #[source]
        source: crate::llm::ModelError,
    },

    #[error("{0} has been shut down")]
    Closed(&'static str),
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Memory path validation and file access failures.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("path traversal is not allowed: {0}")]
    Traversal(String),

    #[error("path is not readable memory (allowed: MEMORY.md, user.md, memory/*.md): {0}")]
    NotAllowed(String),

    #[error("failed to access memory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
