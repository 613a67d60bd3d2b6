//! Storage backends for the operation log.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tempfile::NamedTempFile;

use crate::document::StoreDocument;
use crate::error::{StoreError, StoreResult};

/// Where a [`StoreDocument`] lives between runs.
///
/// `persist` must be atomic: after it returns, a crash leaves either the
/// previous document or the new one, never a mix.
pub trait StoreBackend: Send {
    /// Load the stored document, or `None` if nothing has been stored yet.
    fn load(&self) -> StoreResult<Option<StoreDocument>>;

    /// Durably replace the stored document.
    fn persist(&self, document: &StoreDocument) -> StoreResult<()>;

    /// Move an unreadable document aside. Returns where it went.
    fn quarantine(&self) -> StoreResult<Option<PathBuf>> {
        Ok(None)
    }

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

impl<B: StoreBackend + Sync> StoreBackend for Arc<B> {
    fn load(&self) -> StoreResult<Option<StoreDocument>> {
        (**self).load()
    }

    fn persist(&self, document: &StoreDocument) -> StoreResult<()> {
        (**self).persist(document)
    }

    fn quarantine(&self) -> StoreResult<Option<PathBuf>> {
        (**self).quarantine()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A single pretty-printed JSON file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> StoreResult<Option<StoreDocument>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn persist(&self, document: &StoreDocument) -> StoreResult<()> {
        let dir = self.parent_dir();
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(write_err)?;
        let bytes = serde_json::to_vec_pretty(document)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        // Make the rename itself durable.
        #[cfg(unix)]
        if let Ok(dir) = fs::File::open(&dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }

    fn quarantine(&self) -> StoreResult<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let aside = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            name,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));

        fs::rename(&self.path, &aside).map_err(|source| StoreError::Write {
            path: aside.clone(),
            source,
        })?;
        Ok(Some(aside))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend for tests and dry runs.
///
/// Writes can be made to fail on demand to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Mutex<Option<StoreDocument>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn with_document(document: StoreDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `persist` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The last successfully persisted document.
    pub fn document(&self) -> Option<StoreDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<StoreDocument>> {
        Ok(self.document())
    }

    fn persist(&self, document: &StoreDocument) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(document.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
