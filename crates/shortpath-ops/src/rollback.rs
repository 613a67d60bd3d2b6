//! Rollback of created aliases.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use shortpath_core::{LinkError, Operation, OperationId, OperationKind, OperationStatus};
use shortpath_store::{OperationLog, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::creator::{LinkCreator, RemoveOutcome};
use crate::recovery::recover_interrupted;

/// An alias that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackFailure {
    pub operation_id: OperationId,
    pub target: PathBuf,
    pub message: String,
}

/// Result of a rollback pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSummary {
    /// Aliases removed.
    pub rolled_back: usize,
    /// Operations whose alias was already gone.
    pub already_absent: usize,
    /// Operations left as `Success`.
    pub failures: Vec<RollbackFailure>,
    /// The pass stopped early on cancellation.
    pub cancelled: bool,
}

impl RollbackSummary {
    /// Operations moved to `RolledBack`.
    pub fn total(&self) -> usize {
        self.rolled_back + self.already_absent
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes aliases recorded as `Success`, newest first.
///
/// Only the alias is ever deleted; the original path is never touched.
/// An alias that fails verification or removal is reported and left in
/// place with its operation still `Success`, so a later pass can retry.
pub struct RollbackEngine {
    creator: Arc<dyn LinkCreator>,
    cancel: CancellationToken,
}

impl RollbackEngine {
    pub fn new(creator: Arc<dyn LinkCreator>) -> Self {
        Self {
            creator,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between operations when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Roll back every successful link operation.
    ///
    /// Operations an interrupted run left in progress are settled first, so
    /// an alias created just before a crash is rolled back too.
    pub async fn rollback_all(&self, log: &mut OperationLog) -> Result<RollbackSummary, StoreError> {
        recover_interrupted(log, self.creator.as_ref())?;
        let mut pending: Vec<Operation> = log
            .operations_with_status(OperationStatus::Success)
            .into_iter()
            .filter(|op| op.kind == OperationKind::CreateLink)
            .collect();
        // Stable sort keeps append order as the tie-break.
        pending.sort_by_key(|op| op.timestamp);
        pending.reverse();

        let mut summary = RollbackSummary::default();
        for op in pending {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.rollback_one(log, &op, &mut summary).await?;
        }

        info!(
            rolled_back = summary.rolled_back,
            already_absent = summary.already_absent,
            failed = summary.failures.len(),
            "Rollback complete"
        );
        Ok(summary)
    }

    /// Roll back a single operation by id.
    ///
    /// Operations that are not `Success` are left alone and produce an
    /// empty summary.
    pub async fn rollback_operation(
        &self,
        log: &mut OperationLog,
        id: OperationId,
    ) -> Result<RollbackSummary, StoreError> {
        if log.operation(id).is_none() {
            return Err(StoreError::UnknownOperation(id));
        }
        recover_interrupted(log, self.creator.as_ref())?;
        let op = log.operation(id).ok_or(StoreError::UnknownOperation(id))?;
        let mut summary = RollbackSummary::default();
        if op.is_active() && op.kind == OperationKind::CreateLink {
            self.rollback_one(log, &op, &mut summary).await?;
        } else {
            info!(operation = %id, status = %op.status, "Nothing to roll back");
        }
        Ok(summary)
    }

    async fn rollback_one(
        &self,
        log: &mut OperationLog,
        op: &Operation,
        summary: &mut RollbackSummary,
    ) -> Result<(), StoreError> {
        match self.remove(op).await {
            Ok(outcome) => {
                log.update_operation_status(op.id, OperationStatus::RolledBack, None)?;
                match outcome {
                    RemoveOutcome::Removed => {
                        info!(alias = %op.target_path.display(), "Removed alias");
                        summary.rolled_back += 1;
                    }
                    RemoveOutcome::AlreadyAbsent => {
                        info!(alias = %op.target_path.display(), "Alias already absent");
                        summary.already_absent += 1;
                    }
                }
            }
            Err(e) => {
                warn!(alias = %op.target_path.display(), "Rollback failed: {e}");
                summary.failures.push(RollbackFailure {
                    operation_id: op.id,
                    target: op.target_path.clone(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn remove(&self, op: &Operation) -> Result<RemoveOutcome, LinkError> {
        let creator = Arc::clone(&self.creator);
        let target = op.target_path.clone();
        let source = op.source_path.clone();
        let link_type = op.link_type;
        tokio::task::spawn_blocking(move || creator.remove_link(&target, link_type, &source))
            .await
            .map_err(|e| {
                LinkError::platform("remove link", &op.target_path, std::io::Error::other(e))
            })?
    }
}
