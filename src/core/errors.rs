//! DSW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DswError>;

/// Top-level error type for docksweep.
#[derive(Debug, Error)]
pub enum DswError {
    #[error("[DSW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DSW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DSW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DSW-1004] invalid cron expression {expression:?}: {details}")]
    InvalidSchedule {
        expression: String,
        details: String,
    },

    #[error("[DSW-2001] cannot reach the Docker daemon: {details}")]
    Connectivity { details: String },

    #[error("[DSW-2002] resource not found: {id}")]
    ResourceNotFound { id: String },

    #[error("[DSW-2003] resource in use: {id}")]
    ResourceInUse { id: String },

    #[error("[DSW-2004] removal failed for {id}: {details}")]
    RemovalFailed { id: String, details: String },

    #[error("[DSW-2005] Docker API failure: {details}")]
    Api { details: String },

    #[error("[DSW-3001] backup failure: {details}")]
    BackupFailure { details: String },

    #[error("[DSW-3002] corrupt backup at {path}: {details}")]
    BackupCorrupt { path: PathBuf, details: String },

    #[error("[DSW-4001] host command failure for {command:?}: {details}")]
    HostCommand { command: String, details: String },

    #[error("[DSW-5001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DSW-5002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DswError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DSW-1001",
            Self::MissingConfig { .. } => "DSW-1002",
            Self::ConfigParse { .. } => "DSW-1003",
            Self::InvalidSchedule { .. } => "DSW-1004",
            Self::Connectivity { .. } => "DSW-2001",
            Self::ResourceNotFound { .. } => "DSW-2002",
            Self::ResourceInUse { .. } => "DSW-2003",
            Self::RemovalFailed { .. } => "DSW-2004",
            Self::Api { .. } => "DSW-2005",
            Self::BackupFailure { .. } => "DSW-3001",
            Self::BackupCorrupt { .. } => "DSW-3002",
            Self::HostCommand { .. } => "DSW-4001",
            Self::Serialization { .. } => "DSW-5001",
            Self::Io { .. } => "DSW-5002",
        }
    }

    /// Whether the failure aborts an entire cleanup run.
    ///
    /// Only a lost daemon connection and a failed pre-removal backup are
    /// run-fatal. Everything else is absorbed at the resource or step level
    /// and surfaces through the report instead.
    #[must_use]
    pub const fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::BackupFailure { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DswError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DswError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
