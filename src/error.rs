use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found on PATH")]
    Unavailable(String),

    #[error("{tool} failed: {reason}")]
    Invocation { tool: String, reason: String },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("another instance is already listening on {0}")]
    AlreadyRunning(PathBuf),

    #[error("control socket {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
