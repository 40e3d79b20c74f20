//! Error types for corpus-prep

use std::path::PathBuf;

use thiserror::Error;

/// Configuration-level failures. Per-item I/O problems never surface here;
/// they are logged and recorded in the run report instead.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("{what} not found: {}", path.display())]
    MissingDirectory { what: &'static str, path: PathBuf },

    #[error("invalid split ratios: train={train}, val={val} ({reason})")]
    InvalidRatios {
        train: f64,
        val: f64,
        reason: &'static str,
    },

    #[error("invalid colour jitter config: {0}")]
    InvalidJitter(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, PrepError>;
