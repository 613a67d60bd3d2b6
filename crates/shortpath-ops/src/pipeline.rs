//! Scan-to-link pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shortpath_core::{ScanError, ScanRecord, ScanWarning, ShortenConfig};
use shortpath_scan::{PathScanner, ScanProgress};
use shortpath_store::{OperationLog, StoreError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::creator::LinkCreator;
use crate::executor::{ExecuteOutcome, LinkExecutor};
use crate::progress::{PipelineEvent, RunSummary};
use crate::recovery::recover_interrupted;
use crate::PIPELINE_CHANNEL_SIZE;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

/// Scans a tree and links every over-length candidate.
///
/// Candidates are processed one at a time: each is appended to the log as
/// soon as the scanner yields it, then handed to the [`LinkExecutor`].
/// Directory reads run on a blocking worker while links are created.
pub struct Pipeline {
    config: ShortenConfig,
    creator: Arc<dyn LinkCreator>,
    cancel: CancellationToken,
    events_tx: broadcast::Sender<PipelineEvent>,
    scan_tx: broadcast::Sender<ScanProgress>,
}

impl Pipeline {
    pub fn new(config: ShortenConfig, creator: Arc<dyn LinkCreator>) -> Self {
        let (events_tx, _) = broadcast::channel(PIPELINE_CHANNEL_SIZE);
        let (scan_tx, _) = broadcast::channel(PIPELINE_CHANNEL_SIZE);
        Self {
            config,
            creator,
            cancel: CancellationToken::new(),
            events_tx,
            scan_tx,
        }
    }

    /// Stop between candidates when `cancel` fires.
    ///
    /// Work already recorded stays recorded.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribe to per-candidate events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    /// Subscribe to scan progress.
    pub fn subscribe_scan(&self) -> broadcast::Receiver<ScanProgress> {
        self.scan_tx.subscribe()
    }

    pub fn config(&self) -> &ShortenConfig {
        &self.config
    }

    pub async fn run(
        &self,
        root: &Path,
        log: &mut OperationLog,
    ) -> Result<RunSummary, PipelineError> {
        let scanner =
            PathScanner::from_config(&self.config)?.with_cancellation(self.cancel.clone());
        let (tx, mut rx) = mpsc::channel(PIPELINE_CHANNEL_SIZE);
        let worker = self.spawn_scan(scanner, root.to_path_buf(), tx);

        let recovered = recover_interrupted(log, self.creator.as_ref())?;
        let mut executor = LinkExecutor::new(self.config.clone(), Arc::clone(&self.creator), log);
        let mut summary = RunSummary {
            recovered: recovered.total(),
            ..Default::default()
        };
        let mut created = 0usize;
        let limit = self.config.max_operations_per_batch;

        info!(
            root = %root.display(),
            link_root = %self.config.short_link_root.display(),
            "Starting run"
        );

        loop {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                record = rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            log.append_scan_record(record.clone())?;
            summary.scanned += 1;
            summary.candidate_bytes += record.size;
            let _ = self.events_tx.send(PipelineEvent::Candidate {
                path: record.path.clone(),
                index: summary.scanned,
            });

            if created >= limit {
                debug!(path = %record.path.display(), "Batch limit reached, deferring");
                summary.deferred += 1;
                continue;
            }

            match executor.execute(&record, log).await? {
                ExecuteOutcome::Linked(op) => {
                    created += 1;
                    summary.linked += 1;
                    let _ = self.events_tx.send(PipelineEvent::Linked {
                        operation_id: op.id,
                        source: op.source_path,
                        target: op.target_path,
                        link_type: op.link_type,
                    });
                }
                ExecuteOutcome::Failed(op) => {
                    created += 1;
                    summary.failed += 1;
                    let _ = self.events_tx.send(PipelineEvent::Failed {
                        source: op.source_path,
                        message: op.error_message.unwrap_or_default(),
                    });
                }
                ExecuteOutcome::AlreadyLinked { .. } => summary.already_linked += 1,
                ExecuteOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }

        // Unblock the worker if it is waiting to hand over a record.
        rx.close();
        let warnings = match worker.await {
            Ok(result) => result?,
            Err(e) => return Err(PipelineError::Worker(e.to_string())),
        };
        summary.warnings = warnings.len();

        if summary.cancelled {
            warn!(scanned = summary.scanned, "Run cancelled");
        }
        if summary.deferred > 0 {
            info!(
                deferred = summary.deferred,
                limit,
                "Batch limit reached, run again to continue"
            );
        }
        info!(
            scanned = summary.scanned,
            linked = summary.linked,
            already_linked = summary.already_linked,
            failed = summary.failed,
            skipped = summary.skipped,
            "Run complete"
        );

        let _ = self.events_tx.send(PipelineEvent::Complete(summary.clone()));
        Ok(summary)
    }

    /// Walk the tree on a blocking worker, sending candidates through `tx`.
    fn spawn_scan(
        &self,
        scanner: PathScanner,
        root: PathBuf,
        tx: mpsc::Sender<ScanRecord>,
    ) -> tokio::task::JoinHandle<Result<Vec<ScanWarning>, ScanError>> {
        let mut progress_rx = scanner.subscribe();
        let scan_tx = self.scan_tx.clone();
        tokio::spawn(async move {
            loop {
                match progress_rx.recv().await {
                    Ok(progress) => {
                        let _ = scan_tx.send(progress);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        tokio::task::spawn_blocking(move || {
            let mut scan = scanner.scan(&root)?;
            for record in scan.by_ref() {
                if tx.blocking_send(record).is_err() {
                    break;
                }
            }
            Ok(scan.take_warnings())
        })
    }
}
