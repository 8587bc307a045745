//! Error types for xplog-core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum XplogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Header rewrite of {path} aborted, prior content kept at {temp}: {source}")]
    RewriteAborted {
        path: PathBuf,
        temp: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} awaits recovery from {temp}; nothing was written")]
    AwaitingRecovery { path: PathBuf, temp: PathBuf },

    #[error("No recovery artifact found for {0}")]
    NoRecoveryArtifact(PathBuf),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, XplogError>;
