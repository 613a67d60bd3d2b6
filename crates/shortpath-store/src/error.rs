//! Store error types.

use std::path::PathBuf;

use shortpath_core::{OperationId, OperationStatus};
use thiserror::Error;

/// Errors from the operation log.
///
/// Any of these aborts a run: once persistence is unreliable, later
/// operations cannot be recorded durably.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the backing file failed.
    #[error("Failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the backing file failed.
    #[error("Failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the document failed.
    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The backing file exists but cannot be parsed.
    #[error("Store {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The document was written by a newer version.
    #[error("Store schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// An operation with this id already exists.
    #[error("Operation {0} already exists")]
    DuplicateOperation(OperationId),

    /// No operation with this id.
    #[error("Unknown operation {0}")]
    UnknownOperation(OperationId),

    /// New operations must start in progress.
    #[error("Operation {id} must be appended as InProgress, not {status}")]
    NotInProgress {
        id: OperationId,
        status: OperationStatus,
    },

    /// The requested status change is not part of the lifecycle.
    #[error("Operation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },

    /// Failed operations must say why.
    #[error("Operation {0} marked Failed without an error message")]
    MissingErrorMessage(OperationId),

    /// Mappings may only reference successful operations.
    #[error("Mapping references operation {id} with status {status:?}")]
    OrphanMapping {
        id: OperationId,
        status: Option<OperationStatus>,
    },

    /// The in-memory backend was told to fail.
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
