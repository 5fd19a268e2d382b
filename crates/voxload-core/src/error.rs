use crate::types::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to read chunk file {path:?}: {source}")]
    ChunkRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk directory not readable {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single participant API call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Connection refused, reset, DNS failure or request timeout.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected status code {status}")]
    Protocol { status: u16 },

    #[error("malformed response body: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Transport(_) => FailureKind::Transport,
            ApiError::Protocol { .. } => FailureKind::Protocol,
            ApiError::Parse(_) => FailureKind::Parse,
        }
    }
}
