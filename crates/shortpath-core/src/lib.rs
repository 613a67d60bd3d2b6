//! Core types and configuration for shortpath.
//!
//! This crate provides the records shared by the scanner, the link engine
//! and the operation log, together with run configuration and error types.

mod config;
mod error;
mod operation;
mod record;

pub use config::{
    ConfigOverlay, LinkPreferences, ShortenConfig, ShortenConfigBuilder, default_link_root,
    default_store_path,
};
pub use error::{ConfigError, LinkError, NamingError, ScanError, ScanWarning, WarningKind};
pub use operation::{
    LinkPreference, LinkType, Operation, OperationId, OperationKind, OperationStatus, PathMapping,
};
pub use record::{ObjectKind, ScanRecord, path_length};
