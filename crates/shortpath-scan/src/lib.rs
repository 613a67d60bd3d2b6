//! Over-long path discovery for shortpath.
//!
//! This crate walks a directory tree using jwalk and yields a
//! [`ScanRecord`] for every file or directory whose absolute path is longer
//! than the configured threshold.
//!
//! # Overview
//!
//! - **Lazy**: candidates are produced as directories are read
//! - **Cycle safe**: symlinks, junctions and other reparse points are never descended
//! - **Continue on error**: unreadable subtrees become [`ScanWarning`]s
//! - **Exclusions**: glob patterns matched against full paths; excluded
//!   directories are not descended
//!
//! # Example
//!
//! ```rust,no_run
//! use shortpath_scan::{ExcludeFilter, PathScanner};
//!
//! let scanner = PathScanner::new(240, ExcludeFilter::empty());
//! let mut scan = scanner.scan("/path/to/scan").unwrap();
//!
//! for record in scan.by_ref() {
//!     println!("{} ({} chars)", record.path.display(), record.length);
//! }
//! println!("{} warning(s)", scan.warnings().len());
//! ```

mod filter;
mod progress;
mod scanner;

pub use filter::ExcludeFilter;
pub use progress::ScanProgress;
pub use scanner::{PathScanner, Scan};

// Re-export core types for convenience
pub use shortpath_core::{ObjectKind, ScanError, ScanRecord, ScanWarning, WarningKind};
