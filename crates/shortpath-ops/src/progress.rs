//! Run summaries and progress events.

use std::path::PathBuf;

use serde::Serialize;
use shortpath_core::{LinkType, OperationId};

/// End-of-run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Candidates found by the scan.
    pub scanned: usize,
    /// New aliases created.
    pub linked: usize,
    /// Candidates that already had a live alias.
    pub already_linked: usize,
    /// Operations that ended Failed.
    pub failed: usize,
    /// Candidates that could not be named.
    pub skipped: usize,
    /// Candidates left for a later run by the batch limit.
    pub deferred: usize,
    /// Non-fatal scan warnings.
    pub warnings: usize,
    /// Sum of candidate file sizes in bytes.
    pub candidate_bytes: u64,
    /// Operations left in progress by an earlier run, settled first.
    pub recovered: usize,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

impl RunSummary {
    /// Check if every attempted candidate succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Events emitted while a pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A candidate was recorded.
    Candidate { path: PathBuf, index: usize },
    /// An alias was created.
    Linked {
        operation_id: OperationId,
        source: PathBuf,
        target: PathBuf,
        link_type: LinkType,
    },
    /// A candidate's operation failed.
    Failed { source: PathBuf, message: String },
    /// The run finished.
    Complete(RunSummary),
}
