//! Scan record types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Kind of file system object a record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ObjectKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl ObjectKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, ObjectKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, ObjectKind::File)
    }
}

/// One over-length path found by the scanner.
///
/// Records are immutable once written and are never removed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// When the path was observed.
    pub scanned_at: DateTime<Utc>,
    /// Absolute path, case preserved.
    pub path: PathBuf,
    /// Path length in characters.
    pub length: usize,
    /// File or directory.
    pub kind: ObjectKind,
    /// Size in bytes (0 for directories).
    #[serde(default)]
    pub size: u64,
    /// Last modification time, if the platform reports one.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// Always true for records emitted by the scanner.
    #[serde(default = "default_true")]
    pub needs_shortening: bool,
}

fn default_true() -> bool {
    true
}

impl ScanRecord {
    /// Create a record for a path observed now.
    pub fn new(path: impl Into<PathBuf>, kind: ObjectKind) -> Self {
        let path = path.into();
        Self {
            scanned_at: Utc::now(),
            length: path_length(&path),
            path,
            kind,
            size: 0,
            modified_at: None,
            needs_shortening: true,
        }
    }

    /// Set the size in bytes.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the modification time.
    pub fn with_modified(mut self, modified_at: Option<DateTime<Utc>>) -> Self {
        self.modified_at = modified_at;
        self
    }
}

/// Length of a path in characters, the unit path limits are expressed in.
pub fn path_length(path: &Path) -> usize {
    path.to_string_lossy().chars().count()
}
