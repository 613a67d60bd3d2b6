//! Durable operation log for shortpath.
//!
//! The log records every scan candidate, every link operation with its
//! lifecycle status, and the mapping from each original path to its alias.
//! It is the sole source of truth for rollback.
//!
//! # Durability
//!
//! Each mutation persists the whole document through a [`StoreBackend`]
//! before returning. [`JsonFileBackend`] writes to a temp file in the same
//! directory, syncs it, and renames it over the store, so a crash leaves
//! either the old or the new document.
//!
//! # Example
//!
//! ```rust,no_run
//! use shortpath_core::{LinkType, Operation, OperationStatus, PathMapping};
//! use shortpath_store::OperationLog;
//!
//! let mut log = OperationLog::open_file("operations.json")?;
//! let op = Operation::create_link("/deep/path", "/links/path_1a2b", LinkType::Junction);
//! log.append_operation(op.clone())?;
//! let op = log.update_operation_status(op.id, OperationStatus::Success, None)?;
//! log.append_path_mapping(PathMapping::new(&op, "1a2b"))?;
//! # Ok::<(), shortpath_store::StoreError>(())
//! ```

mod backend;
mod document;
mod error;
mod log;
mod report;

pub use backend::{JsonFileBackend, MemoryBackend, StoreBackend};
pub use document::{SCHEMA_VERSION, StoreDocument, StoreMetadata};
pub use error::{StoreError, StoreResult};
pub use log::OperationLog;
pub use report::StatusReport;
