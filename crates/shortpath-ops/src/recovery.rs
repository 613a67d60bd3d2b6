//! Settling operations left in progress by an interrupted run.

use std::path::Path;

use serde::Serialize;
use shortpath_core::{OperationStatus, PathMapping};
use shortpath_store::{OperationLog, StoreError};
use tracing::{info, warn};

use crate::creator::LinkCreator;
use crate::naming::digest_hex;

/// Error text recorded on operations whose link call never completed.
pub const INTERRUPTED: &str = "Interrupted before the link was confirmed";

/// Counts from a recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySummary {
    /// Operations whose alias was found live and completed as `Success`.
    pub completed: usize,
    /// Operations with no live alias, marked `Failed`.
    pub abandoned: usize,
}

impl RecoverySummary {
    pub fn total(&self) -> usize {
        self.completed + self.abandoned
    }
}

/// Settle every `InProgress` operation in `log`.
///
/// A crash between creating an alias and recording the outcome leaves the
/// operation `InProgress`. If its alias is live it is completed with a
/// path mapping so rollback and name allocation see it; otherwise it is
/// marked `Failed`. Nothing on disk is changed.
pub fn recover_interrupted(
    log: &mut OperationLog,
    creator: &dyn LinkCreator,
) -> Result<RecoverySummary, StoreError> {
    let mut summary = RecoverySummary::default();

    for op in log.operations_with_status(OperationStatus::InProgress) {
        if creator.is_alias_of(&op.target_path, op.link_type, &op.source_path) {
            let op = log.update_operation_status(op.id, OperationStatus::Success, None)?;
            let hash = recorded_hash(&op.target_path, &op.source_path);
            log.append_path_mapping(PathMapping::new(&op, hash))?;
            info!(
                operation = %op.id,
                alias = %op.target_path.display(),
                "Completed interrupted operation"
            );
            summary.completed += 1;
        } else {
            log.update_operation_status(
                op.id,
                OperationStatus::Failed,
                Some(INTERRUPTED.to_string()),
            )?;
            warn!(
                operation = %op.id,
                alias = %op.target_path.display(),
                "Interrupted operation has no live alias, marked failed"
            );
            summary.abandoned += 1;
        }
    }

    Ok(summary)
}

/// The hash segment of an alias name.
///
/// The hash length in force when the alias was named is not recorded on
/// the operation, so the longest name segment that prefixes the source
/// digest is taken.
fn recorded_hash(target: &Path, source: &Path) -> String {
    let digest = digest_hex(source);
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .and_then(|name| {
            name.split('_')
                .filter(|seg| !seg.is_empty() && digest.starts_with(*seg))
                .max_by_key(|seg| seg.len())
                .map(str::to_string)
        })
        .unwrap_or(digest)
}
