use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration failures. All of these are fatal.
#[derive(Debug, Error)]
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

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to write default config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The probe could not tell whether the camera is in use.
///
/// Everything except [`ProbeError::Unsupported`] is treated as a transient,
/// per-tick failure by the poll loop.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("camera detection is not supported on {0}")]
    Unsupported(&'static str),

    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe OS error: {0}")]
    Os(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// A single report to the event sink failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request to activity server failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("activity server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("report timed out after {0:?}")]
    Timeout(Duration),
}
