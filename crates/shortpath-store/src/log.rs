//! The operation log.

use std::path::Path;

use shortpath_core::{Operation, OperationId, OperationStatus, PathMapping, ScanRecord};
use tracing::{debug, warn};

use crate::backend::{JsonFileBackend, MemoryBackend, StoreBackend};
use crate::document::{SCHEMA_VERSION, StoreDocument, StoreMetadata};
use crate::error::{StoreError, StoreResult};

/// Durable, append-mostly record of scans, operations and mappings.
///
/// Every mutation is persisted before it returns. If persisting fails the
/// in-memory state is left exactly as it was before the call, so callers
/// never observe a change that is not on disk.
pub struct OperationLog {
    document: StoreDocument,
    backend: Box<dyn StoreBackend>,
}

impl std::fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLog")
            .field("backend", &self.backend.describe())
            .field("operations", &self.document.operations.len())
            .field("path_mappings", &self.document.path_mappings.len())
            .field("scan_records", &self.document.scan_records.len())
            .finish()
    }
}

impl OperationLog {
    /// Open a log over any backend.
    ///
    /// A missing document starts a fresh log. A corrupt one is quarantined
    /// and replaced with a fresh log. A document from a newer schema is
    /// refused.
    pub fn open(backend: impl StoreBackend + 'static) -> StoreResult<Self> {
        let backend: Box<dyn StoreBackend> = Box::new(backend);

        let document = match backend.load() {
            Ok(Some(document)) => {
                if document.metadata.schema_version > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema {
                        found: document.metadata.schema_version,
                        supported: SCHEMA_VERSION,
                    });
                }
                for issue in document.validate() {
                    warn!(store = %backend.describe(), "{issue}");
                }
                debug!(
                    store = %backend.describe(),
                    operations = document.operations.len(),
                    "Loaded operation log"
                );
                document
            }
            Ok(None) => {
                warn!(store = %backend.describe(), "No operation log found, starting fresh");
                StoreDocument::new()
            }
            Err(StoreError::Corrupt { path, message }) => {
                let aside = backend.quarantine()?;
                warn!(
                    store = %path.display(),
                    moved_to = ?aside,
                    "Operation log is corrupt ({message}), starting fresh"
                );
                StoreDocument::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Self { document, backend })
    }

    /// Open a log stored as JSON at `path`.
    pub fn open_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(JsonFileBackend::new(path.as_ref()))
    }

    /// A log that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            document: StoreDocument::new(),
            backend: Box::new(MemoryBackend::new()),
        }
    }

    /// Where the log is persisted.
    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// Apply `mutate` to a copy, persist it, then adopt it.
    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut StoreDocument) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut next = self.document.clone();
        let value = mutate(&mut next)?;
        next.touch();
        self.backend.persist(&next)?;
        self.document = next;
        Ok(value)
    }

    // ==================== Mutations ====================

    /// Record an over-length path observed by a scan.
    pub fn append_scan_record(&mut self, record: ScanRecord) -> StoreResult<()> {
        self.commit(|doc| {
            doc.scan_records.push(record);
            Ok(())
        })
    }

    /// Record a new operation. It must be `InProgress` with a fresh id.
    pub fn append_operation(&mut self, operation: Operation) -> StoreResult<()> {
        if operation.status != OperationStatus::InProgress {
            return Err(StoreError::NotInProgress {
                id: operation.id,
                status: operation.status,
            });
        }
        if self.document.operations.iter().any(|op| op.id == operation.id) {
            return Err(StoreError::DuplicateOperation(operation.id));
        }

        self.commit(|doc| {
            doc.operations.push(operation);
            Ok(())
        })
    }

    /// Move an operation along its lifecycle.
    ///
    /// `Failed` requires an error message; every other status clears it.
    /// Returns the updated operation.
    pub fn update_operation_status(
        &mut self,
        id: OperationId,
        status: OperationStatus,
        error_message: Option<String>,
    ) -> StoreResult<Operation> {
        if status == OperationStatus::Failed && error_message.is_none() {
            return Err(StoreError::MissingErrorMessage(id));
        }

        self.commit(|doc| {
            let op = doc
                .operations
                .iter_mut()
                .find(|op| op.id == id)
                .ok_or(StoreError::UnknownOperation(id))?;

            if !op.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    id,
                    from: op.status,
                    to: status,
                });
            }

            op.status = status;
            op.error_message = match status {
                OperationStatus::Failed => error_message,
                _ => None,
            };
            Ok(op.clone())
        })
    }

    /// Record the mapping for a successful operation.
    pub fn append_path_mapping(&mut self, mapping: PathMapping) -> StoreResult<()> {
        let status = self
            .document
            .operations
            .iter()
            .find(|op| op.id == mapping.operation_id)
            .map(|op| op.status);
        if status != Some(OperationStatus::Success) {
            return Err(StoreError::OrphanMapping {
                id: mapping.operation_id,
                status,
            });
        }

        self.commit(|doc| {
            doc.path_mappings.push(mapping);
            Ok(())
        })
    }

    // ==================== Queries ====================

    /// All operations in append order.
    pub fn operations(&self) -> Vec<Operation> {
        self.document.operations.clone()
    }

    pub fn operation(&self, id: OperationId) -> Option<Operation> {
        self.document.operations.iter().find(|op| op.id == id).cloned()
    }

    /// Operations currently in `status`, in append order.
    pub fn operations_with_status(&self, status: OperationStatus) -> Vec<Operation> {
        self.document
            .operations
            .iter()
            .filter(|op| op.status == status)
            .cloned()
            .collect()
    }

    pub fn path_mappings(&self) -> Vec<PathMapping> {
        self.document.path_mappings.clone()
    }

    pub fn scan_records(&self) -> Vec<ScanRecord> {
        self.document.scan_records.clone()
    }

    pub fn metadata(&self) -> StoreMetadata {
        self.document.metadata.clone()
    }

    /// Mappings whose operation is still `Success`.
    pub fn active_mappings(&self) -> Vec<PathMapping> {
        self.document
            .path_mappings
            .iter()
            .filter(|m| self.is_active(m.operation_id))
            .cloned()
            .collect()
    }

    /// The live mapping for an original path, if any.
    pub fn active_mapping_for(&self, original: &Path) -> Option<PathMapping> {
        self.document
            .path_mappings
            .iter()
            .rev()
            .find(|m| m.original_path == original && self.is_active(m.operation_id))
            .cloned()
    }

    fn is_active(&self, id: OperationId) -> bool {
        self.document
            .operations
            .iter()
            .any(|op| op.id == id && op.is_active())
    }
}
