//! Error types shared across the shortening pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::LinkType;
use crate::record::ObjectKind;

/// Fatal errors that prevent a scan from starting.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid exclusion pattern.
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal warning encountered during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying permission failures.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self {
                message: format!("Permission denied: {}", path.display()),
                path,
                kind: WarningKind::PermissionDenied,
            },
            _ => Self {
                message: format!("Read error: {error}"),
                path,
                kind: WarningKind::ReadError,
            },
        }
    }
}

/// A short name could not be produced for a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("Path has no usable final component: {path}")]
    EmptyBasename { path: PathBuf },

    #[error("Hash length {length} is outside 1..=64")]
    InvalidHashLength { length: usize },
}

/// Errors that make a single link creation or removal fail.
///
/// These never abort a batch; they are recorded against the operation.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{requested} cannot be used for a {kind} ({reason})")]
    IncompatibleLinkType {
        requested: LinkType,
        kind: ObjectKind,
        reason: &'static str,
    },

    #[error("No free short name for {source_path} after {attempts} attempts")]
    ConflictExhausted { source_path: PathBuf, attempts: usize },

    #[error("{action} failed for {path}: {source}")]
    Platform {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Link creation for {path} did not finish within {seconds}s")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("{path} is no longer an alias of {source_path}")]
    NotAnAlias { path: PathBuf, source_path: PathBuf },

    #[error("Source {source_path} is missing; {path} may hold the only copy")]
    SourceMissing { path: PathBuf, source_path: PathBuf },
}

impl LinkError {
    /// Wrap a platform I/O error with the action that failed.
    pub fn platform(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Platform {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
