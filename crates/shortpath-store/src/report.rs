//! Store status report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shortpath_core::{Operation, OperationStatus};

use crate::document::StoreDocument;

/// Counts and failures summarizing a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_operations: usize,
    pub in_progress: usize,
    pub success: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub path_mappings: usize,
    /// Mappings whose alias is still live.
    pub active_mappings: usize,
    pub scan_records: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Every `Failed` operation, oldest first.
    pub failures: Vec<Operation>,
}

impl StatusReport {
    pub fn from_document(document: &StoreDocument) -> Self {
        let count = |status: OperationStatus| {
            document
                .operations
                .iter()
                .filter(|op| op.status == status)
                .count()
        };

        let active_mappings = document
            .path_mappings
            .iter()
            .filter(|m| {
                document
                    .operations
                    .iter()
                    .any(|op| op.id == m.operation_id && op.is_active())
            })
            .count();

        Self {
            total_operations: document.operations.len(),
            in_progress: count(OperationStatus::InProgress),
            success: count(OperationStatus::Success),
            failed: count(OperationStatus::Failed),
            rolled_back: count(OperationStatus::RolledBack),
            path_mappings: document.path_mappings.len(),
            active_mappings,
            scan_records: document.scan_records.len(),
            created_at: document.metadata.created_at,
            last_updated_at: document.metadata.last_updated_at,
            failures: document
                .operations
                .iter()
                .filter(|op| op.status == OperationStatus::Failed)
                .cloned()
                .collect(),
        }
    }
}
