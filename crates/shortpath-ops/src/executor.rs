//! Per-candidate link execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shortpath_core::{
    LinkError, LinkType, ObjectKind, Operation, OperationStatus, PathMapping, ScanRecord,
    ShortenConfig,
};
use shortpath_store::{OperationLog, StoreError};
use tracing::{debug, info, warn};

use crate::conflict::NameIndex;
use crate::creator::LinkCreator;
use crate::naming::generate;
use crate::select::LinkTypeSelector;

/// What happened to one candidate.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// An alias was created; the operation is `Success`.
    Linked(Operation),
    /// The operation was recorded as `Failed`.
    Failed(Operation),
    /// A live alias from an earlier run already covers the candidate.
    AlreadyLinked { target: PathBuf },
    /// No operation was recorded.
    Skipped { reason: String },
}

/// Turns scan candidates into aliases, recording each attempt.
///
/// Link errors never escape: they become `Failed` operations. Only store
/// errors are returned, since they make further recording impossible.
pub struct LinkExecutor {
    config: ShortenConfig,
    creator: Arc<dyn LinkCreator>,
    selector: LinkTypeSelector,
    names: NameIndex,
}

impl std::fmt::Debug for LinkExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkExecutor")
            .field("link_root", &self.config.short_link_root)
            .field("names", &self.names.len())
            .finish()
    }
}

impl LinkExecutor {
    /// Create an executor whose name index is seeded from `log`.
    pub fn new(config: ShortenConfig, creator: Arc<dyn LinkCreator>, log: &OperationLog) -> Self {
        let names = NameIndex::seed(&log.active_mappings());
        let selector = LinkTypeSelector::new(config.link_preferences);
        Self {
            config,
            creator,
            selector,
            names,
        }
    }

    pub fn config(&self) -> &ShortenConfig {
        &self.config
    }

    pub async fn execute(
        &mut self,
        candidate: &ScanRecord,
        log: &mut OperationLog,
    ) -> Result<ExecuteOutcome, StoreError> {
        let source = candidate.path.as_path();

        let short = match generate(source, self.config.prefix_length, self.config.hash_length) {
            Ok(short) => short,
            Err(e) => {
                warn!(path = %source.display(), "Skipping candidate: {e}");
                return Ok(ExecuteOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        if let Some(mapping) = log.active_mapping_for(source) {
            if self.creator.exists(&mapping.short_path) {
                debug!(
                    path = %source.display(),
                    alias = %mapping.short_path.display(),
                    "Already linked"
                );
                return Ok(ExecuteOutcome::AlreadyLinked {
                    target: mapping.short_path,
                });
            }
            debug!(
                path = %source.display(),
                alias = %mapping.short_path.display(),
                "Recorded alias is missing, linking again"
            );
        }

        let root = self.config.short_link_root.clone();
        let provisional = root.join(short.name.as_str());

        let same_volume = self.creator.same_volume(source, &root);
        let link_type = match self
            .selector
            .select(candidate.kind, same_volume, self.config.link_preference)
        {
            Ok(link_type) => link_type,
            Err(e) => {
                let attempted = match &e {
                    LinkError::IncompatibleLinkType { requested, .. } => *requested,
                    _ => LinkType::SymbolicLink,
                };
                return self.record_failure(log, source, &provisional, attempted, &e);
            }
        };
        debug!(path = %source.display(), %link_type, same_volume, "Selected link type");

        let creator = Arc::clone(&self.creator);
        let allocation = self.names.allocate(
            &root,
            &short.name,
            source,
            self.config.max_conflict_attempts,
            |p| creator.exists(p),
        );
        let target = match allocation {
            Ok(allocation) => allocation.path().to_path_buf(),
            Err(e) => return self.record_failure(log, source, &provisional, link_type, &e),
        };

        if let Err(e) = self.creator.create_dir_all(&root) {
            return self.record_failure(log, source, &target, link_type, &e);
        }

        let operation = Operation::create_link(source, &target, link_type);
        let id = operation.id;
        log.append_operation(operation)?;

        match self
            .create_link(link_type, &target, source, candidate.kind)
            .await
        {
            Ok(()) => {
                let operation = log.update_operation_status(id, OperationStatus::Success, None)?;
                log.append_path_mapping(PathMapping::new(&operation, short.hash.as_str()))?;
                info!(
                    path = %source.display(),
                    alias = %target.display(),
                    %link_type,
                    "Created alias"
                );
                Ok(ExecuteOutcome::Linked(operation))
            }
            Err(e) => {
                warn!(path = %source.display(), alias = %target.display(), "Link failed: {e}");
                let operation =
                    log.update_operation_status(id, OperationStatus::Failed, Some(e.to_string()))?;
                Ok(ExecuteOutcome::Failed(operation))
            }
        }
    }

    /// Record an attempt that failed before reaching the file system.
    fn record_failure(
        &self,
        log: &mut OperationLog,
        source: &Path,
        target: &Path,
        link_type: LinkType,
        error: &LinkError,
    ) -> Result<ExecuteOutcome, StoreError> {
        warn!(path = %source.display(), "Cannot link: {error}");
        let operation = Operation::create_link(source, target, link_type);
        let id = operation.id;
        log.append_operation(operation)?;
        let operation =
            log.update_operation_status(id, OperationStatus::Failed, Some(error.to_string()))?;
        Ok(ExecuteOutcome::Failed(operation))
    }

    /// Run the platform call on a blocking worker, bounded by the timeout.
    ///
    /// A call that overruns is still awaited. If it then succeeds, the late
    /// alias is removed so the operation can be recorded as failed; if the
    /// removal fails too, the alias is reported as created so that it stays
    /// reachable by rollback.
    async fn create_link(
        &self,
        link_type: LinkType,
        link: &Path,
        source: &Path,
        kind: ObjectKind,
    ) -> Result<(), LinkError> {
        let creator = Arc::clone(&self.creator);
        let (task_link, task_source) = (link.to_path_buf(), source.to_path_buf());
        let mut task = tokio::task::spawn_blocking(move || {
            creator.create(link_type, &task_link, &task_source, kind)
        });

        let Some(limit) = self.config.link_timeout() else {
            return settle(task.await, link);
        };
        if let Ok(joined) = tokio::time::timeout(limit, &mut task).await {
            return settle(joined, link);
        }

        let timeout = LinkError::Timeout {
            path: link.to_path_buf(),
            seconds: limit.as_secs(),
        };
        warn!(alias = %link.display(), "{timeout}, waiting for the call to return");
        if settle(task.await, link).is_err() {
            return Err(timeout);
        }

        let creator = Arc::clone(&self.creator);
        let (task_link, task_source) = (link.to_path_buf(), source.to_path_buf());
        let removed = tokio::task::spawn_blocking(move || {
            creator.remove_link(&task_link, link_type, &task_source)
        })
        .await;
        match settle(removed, link) {
            Ok(_) => {
                debug!(alias = %link.display(), "Removed alias created after the timeout");
                Err(timeout)
            }
            Err(e) => {
                warn!(
                    alias = %link.display(),
                    "Cannot remove alias created after the timeout, keeping it: {e}"
                );
                Ok(())
            }
        }
    }
}

/// Flatten a blocking task result.
fn settle<T>(
    joined: Result<Result<T, LinkError>, tokio::task::JoinError>,
    link: &Path,
) -> Result<T, LinkError> {
    joined.map_err(|e| LinkError::platform("link worker", link, std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLinkCreator;
    use shortpath_core::LinkPreference;

    fn config() -> ShortenConfig {
        ShortenConfig::builder()
            .max_path_length(100usize)
            .short_link_root("/links")
            .build()
            .unwrap()
    }

    fn setup(config: ShortenConfig) -> (Arc<MemoryLinkCreator>, LinkExecutor, OperationLog) {
        let creator = Arc::new(MemoryLinkCreator::new());
        let log = OperationLog::in_memory();
        let executor = LinkExecutor::new(config, creator.clone(), &log);
        (creator, executor, log)
    }

    #[tokio::test]
    async fn test_links_directory_as_junction() {
        let (creator, mut executor, mut log) = setup(config());
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);

        let outcome = executor.execute(&record, &mut log).await.unwrap();
        let ExecuteOutcome::Linked(op) = outcome else {
            panic!("expected Linked");
        };
        assert_eq!(op.link_type, LinkType::Junction);
        assert_eq!(op.status, OperationStatus::Success);
        assert!(creator.exists(&op.target_path));

        let mapping = &log.path_mappings()[0];
        assert_eq!(mapping.operation_id, op.id);
        assert!(
            op.target_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with(&mapping.hash_value)
        );
    }

    #[tokio::test]
    async fn test_second_execution_is_noop() {
        let (_, mut executor, mut log) = setup(config());
        let record = ScanRecord::new("/deep/very/long/file.txt", ObjectKind::File);

        executor.execute(&record, &mut log).await.unwrap();
        let again = executor.execute(&record, &mut log).await.unwrap();
        assert!(matches!(again, ExecuteOutcome::AlreadyLinked { .. }));
        assert_eq!(log.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_incompatible_preference_fails() {
        let mut config = config();
        config.link_preference = LinkPreference::HardLink;
        let (creator, mut executor, mut log) = setup(config);
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);

        let outcome = executor.execute(&record, &mut log).await.unwrap();
        let ExecuteOutcome::Failed(op) = outcome else {
            panic!("expected Failed");
        };
        assert!(op.error_message.unwrap().contains("hard links"));
        assert_eq!(creator.link_count(), 0);
        assert!(log.path_mappings().is_empty());
    }

    #[tokio::test]
    async fn test_platform_failure_is_recorded() {
        let (creator, mut executor, mut log) = setup(config());
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);
        let short = generate(&record.path, 8, 12).unwrap();
        creator.fail_create_at(Path::new("/links").join(short.name.as_str()));

        let outcome = executor.execute(&record, &mut log).await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Failed(_)));
        let ops = log.operations_with_status(OperationStatus::Failed);
        assert_eq!(ops.len(), 1);
        assert!(ops[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_cross_volume_uses_symlink() {
        let (creator, mut executor, mut log) = setup(config());
        creator.set_same_volume(false);
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);

        let ExecuteOutcome::Linked(op) = executor.execute(&record, &mut log).await.unwrap() else {
            panic!("expected Linked");
        };
        assert_eq!(op.link_type, LinkType::SymbolicLink);
    }

    #[tokio::test]
    async fn test_occupied_name_gets_suffix() {
        let (creator, mut executor, mut log) = setup(config());
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);
        let short = generate(&record.path, 8, 12).unwrap();
        creator.occupy(Path::new("/links").join(short.name.as_str()));

        let ExecuteOutcome::Linked(op) = executor.execute(&record, &mut log).await.unwrap() else {
            panic!("expected Linked");
        };
        assert_eq!(
            op.target_path,
            Path::new("/links").join(format!("{}_1", short.name))
        );
    }

    fn slow_setup(remove_fails: bool) -> (Arc<MemoryLinkCreator>, LinkExecutor, OperationLog) {
        let mut config = config();
        config.link_timeout_secs = 1;
        let creator = Arc::new(
            MemoryLinkCreator::new().with_delay(std::time::Duration::from_millis(1500)),
        );
        if remove_fails {
            let short = generate(Path::new("/deep/very/long/directory"), 8, 12).unwrap();
            creator.fail_remove_at(Path::new("/links").join(short.name.as_str()));
        }
        let log = OperationLog::in_memory();
        let executor = LinkExecutor::new(config, creator.clone(), &log);
        (creator, executor, log)
    }

    #[tokio::test]
    async fn test_timeout_marks_failed_and_leaves_no_alias() {
        let (creator, mut executor, mut log) = slow_setup(false);
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);

        let ExecuteOutcome::Failed(op) = executor.execute(&record, &mut log).await.unwrap() else {
            panic!("expected Failed");
        };
        assert!(op.error_message.unwrap().contains("did not finish"));

        // Nothing finishes later behind the log's back.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(creator.link_count(), 0);
        assert!(log.path_mappings().is_empty());
    }

    #[tokio::test]
    async fn test_late_alias_that_cannot_be_removed_is_recorded() {
        let (creator, mut executor, mut log) = slow_setup(true);
        let record = ScanRecord::new("/deep/very/long/directory", ObjectKind::Directory);

        let ExecuteOutcome::Linked(op) = executor.execute(&record, &mut log).await.unwrap() else {
            panic!("expected Linked");
        };
        assert_eq!(op.status, OperationStatus::Success);
        assert_eq!(creator.link_count(), 1);
        assert_eq!(log.active_mappings().len(), 1);
    }
}
