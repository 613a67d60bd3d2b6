//! The persisted store document.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortpath_core::{Operation, OperationStatus, PathMapping, ScanRecord};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Bookkeeping about the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub last_updated_at: DateTime<Utc>,
}

impl StoreMetadata {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            schema_version: SCHEMA_VERSION,
            last_updated_at: now,
        }
    }
}

/// Everything the operation log persists, in append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,
    #[serde(default)]
    pub scan_records: Vec<ScanRecord>,
    pub metadata: StoreMetadata,
}

impl StoreDocument {
    /// An empty document stamped with the current time.
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            path_mappings: Vec::new(),
            scan_records: Vec::new(),
            metadata: StoreMetadata::new(),
        }
    }

    /// Advance `lastUpdatedAt`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.metadata.last_updated_at {
            self.metadata.last_updated_at = now;
        }
    }

    /// Check structural invariants, returning a description of each violation.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut seen = HashSet::with_capacity(self.operations.len());
        let mut status = HashMap::with_capacity(self.operations.len());

        for op in &self.operations {
            if !seen.insert(op.id) {
                issues.push(format!("duplicate operation id {}", op.id));
            }
            status.insert(op.id, op.status);
            match (op.status, &op.error_message) {
                (OperationStatus::Failed, None) => {
                    issues.push(format!("operation {} is Failed without a message", op.id));
                }
                (OperationStatus::Failed, Some(_)) | (_, None) => {}
                (other, Some(_)) => {
                    issues.push(format!("operation {} is {} but carries a message", op.id, other));
                }
            }
        }

        for mapping in &self.path_mappings {
            match status.get(&mapping.operation_id) {
                Some(OperationStatus::Success | OperationStatus::RolledBack) => {}
                Some(other) => issues.push(format!(
                    "mapping {} references operation with status {}",
                    mapping.short_path.display(),
                    other
                )),
                None => issues.push(format!(
                    "mapping {} references unknown operation {}",
                    mapping.short_path.display(),
                    mapping.operation_id
                )),
            }
        }

        issues
    }
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self::new()
    }
}
