//! Integration tests for shortpath-ops.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shortpath_core::{
    LinkType, ObjectKind, Operation, OperationStatus, ScanRecord, ShortenConfig, path_length,
};
use shortpath_ops::{
    DryRunLinkCreator, ExecuteOutcome, INTERRUPTED, LinkCreator, LinkExecutor, MemoryLinkCreator,
    Pipeline, PipelineError, RollbackEngine, generate,
};
use shortpath_store::{MemoryBackend, OperationLog};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Create a directory under `root` whose absolute path is exactly `total`
/// characters, with every ancestor at most `ancestor_max` characters.
/// Returns the directory and its depth below `root`.
fn make_long_dir(root: &Path, total: usize, ancestor_max: usize) -> (PathBuf, usize) {
    let mut dir = std::path::absolute(root).unwrap();
    let mut depth = 0;

    while path_length(&dir) + 31 <= ancestor_max {
        dir.push(format!("segment_{depth:02}_{}", "s".repeat(19)));
        depth += 1;
    }

    let last = total - path_length(&dir) - 1;
    dir.push("d".repeat(last));
    fs::create_dir_all(&dir).unwrap();
    assert_eq!(path_length(&dir), total);
    (dir, depth + 1)
}

fn config(link_root: &Path, max_path_length: usize) -> ShortenConfig {
    ShortenConfig::builder()
        .max_path_length(max_path_length)
        .short_link_root(link_root)
        .build()
        .unwrap()
}

/// A directory name of 50 characters.
fn long_name(tag: &str) -> String {
    format!("{tag}_{}", "d".repeat(49 - tag.len()))
}

fn record(path: &str, kind: ObjectKind) -> ScanRecord {
    ScanRecord::new(path, kind)
}

#[cfg(unix)]
#[tokio::test]
async fn test_end_to_end_create_and_rollback() {
    use shortpath_ops::FsLinkCreator;

    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    let (deep, depth) = make_long_dir(&tree, 310, 200);
    fs::write(deep.join("report.txt"), "quarterly numbers").unwrap();

    let link_root = temp.path().join("links");
    let mut config = config(&link_root, 200);
    config.max_depth = Some(depth);

    let creator = Arc::new(FsLinkCreator::new());
    let mut log = OperationLog::in_memory();
    let summary = Pipeline::new(config, creator.clone())
        .run(&tree, &mut log)
        .await
        .unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.linked, 1);
    assert_eq!(log.scan_records().len(), 1);
    assert_eq!(log.scan_records()[0].path, deep);

    let ops = log.operations();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].link_type, LinkType::Junction);
    assert_eq!(ops[0].status, OperationStatus::Success);

    let mappings = log.path_mappings();
    assert_eq!(mappings.len(), 1);
    let expected = generate(&deep, 8, 12).unwrap();
    assert_eq!(
        mappings[0].short_path.file_name().unwrap().to_string_lossy(),
        expected.name.as_str()
    );
    assert_eq!(mappings[0].hash_value, expected.hash.as_str());

    let alias = mappings[0].short_path.clone();
    assert_eq!(
        fs::read_to_string(alias.join("report.txt")).unwrap(),
        "quarterly numbers"
    );

    let rollback = RollbackEngine::new(creator)
        .rollback_all(&mut log)
        .await
        .unwrap();
    assert_eq!(rollback.rolled_back, 1);
    assert_eq!(log.operations()[0].status, OperationStatus::RolledBack);
    assert!(fs::symlink_metadata(&alias).is_err());
    assert_eq!(
        fs::read_to_string(deep.join("report.txt")).unwrap(),
        "quarterly numbers"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_rerun_is_idempotent_across_reopen() {
    use shortpath_ops::FsLinkCreator;

    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    let (_, depth) = make_long_dir(&tree, 250, 200);
    let store = temp.path().join("operations.json");

    let mut config = config(&temp.path().join("links"), 200);
    config.max_depth = Some(depth);
    let creator = Arc::new(FsLinkCreator::new());

    {
        let mut log = OperationLog::open_file(&store).unwrap();
        let first = Pipeline::new(config.clone(), creator.clone())
            .run(&tree, &mut log)
            .await
            .unwrap();
        assert_eq!(first.linked, 1);
    }

    let mut log = OperationLog::open_file(&store).unwrap();
    let second = Pipeline::new(config, creator)
        .run(&tree, &mut log)
        .await
        .unwrap();
    assert_eq!(second.linked, 0);
    assert_eq!(second.already_linked, 1);
    assert_eq!(log.operations().len(), 1);
    // Scan records are history and accumulate.
    assert_eq!(log.scan_records().len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hard_link_round_trip() {
    use shortpath_ops::FsLinkCreator;

    let temp = TempDir::new().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir(&tree).unwrap();
    let file = tree.join(format!("{}.txt", "f".repeat(60)));
    fs::write(&file, "original bytes").unwrap();

    let limit = path_length(&std::path::absolute(&file).unwrap()) - 1;
    let creator = Arc::new(FsLinkCreator::new());
    let mut log = OperationLog::in_memory();
    let summary = Pipeline::new(config(&temp.path().join("l"), limit), creator.clone())
        .run(&tree, &mut log)
        .await
        .unwrap();
    assert_eq!(summary.linked, 1);

    let op = &log.operations()[0];
    assert_eq!(op.link_type, LinkType::HardLink);
    assert_eq!(fs::read_to_string(&op.target_path).unwrap(), "original bytes");

    RollbackEngine::new(creator)
        .rollback_all(&mut log)
        .await
        .unwrap();
    assert!(!op.target_path.exists());
    assert_eq!(fs::read_to_string(&file).unwrap(), "original bytes");
}

#[tokio::test]
async fn test_shared_short_names_get_distinct_targets() {
    let mut config = config(Path::new("/links"), 100);
    config.hash_length = 1;

    let creator = Arc::new(MemoryLinkCreator::new());
    let mut log = OperationLog::in_memory();
    let mut executor = LinkExecutor::new(config, creator.clone(), &log);

    // 17 sources over 16 possible hashes: at least two share a name.
    let mut targets = HashSet::new();
    for i in 0..17 {
        let candidate = record(&format!("/data/{i}/samefolder"), ObjectKind::Directory);
        let ExecuteOutcome::Linked(op) = executor.execute(&candidate, &mut log).await.unwrap()
        else {
            panic!("candidate {i} was not linked");
        };
        assert!(targets.insert(op.target_path));
    }
    assert_eq!(creator.link_count(), 17);
    assert!(targets.iter().any(|t| {
        t.file_name()
            .unwrap()
            .to_string_lossy()
            .matches('_')
            .count()
            > 1
    }));
}

#[tokio::test]
async fn test_rollback_leaves_failed_operations_alone() {
    let config = config(Path::new("/links"), 100);
    let creator = Arc::new(MemoryLinkCreator::new());
    let mut log = OperationLog::in_memory();
    let mut executor = LinkExecutor::new(config, creator.clone(), &log);

    let bad = record("/data/one/broken_directory", ObjectKind::Directory);
    let bad_name = generate(&bad.path, 8, 12).unwrap();
    creator.fail_create_at(Path::new("/links").join(bad_name.name.as_str()));

    executor.execute(&bad, &mut log).await.unwrap();
    executor
        .execute(&record("/data/two/good_directory", ObjectKind::Directory), &mut log)
        .await
        .unwrap();

    let summary = RollbackEngine::new(creator.clone())
        .rollback_all(&mut log)
        .await
        .unwrap();
    assert_eq!(summary.rolled_back, 1);

    let failed = log.operations_with_status(OperationStatus::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_path, bad.path);
    assert_eq!(log.operations_with_status(OperationStatus::RolledBack).len(), 1);
}

#[tokio::test]
async fn test_batch_limit_defers_remaining() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    for i in 0..3 {
        fs::create_dir(base.join(long_name(&i.to_string()))).unwrap();
    }

    let mut config = config(Path::new("/links"), path_length(&base) + 40);
    config.max_operations_per_batch = 1;
    let mut log = OperationLog::in_memory();
    let summary = Pipeline::new(config, Arc::new(MemoryLinkCreator::new()))
        .run(temp.path(), &mut log)
        .await
        .unwrap();

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.linked, 1);
    assert_eq!(summary.deferred, 2);
    assert_eq!(log.scan_records().len(), 3);
    assert_eq!(log.operations().len(), 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    fs::create_dir(base.join(long_name("dry_run"))).unwrap();
    let link_root = base.join("links");

    let backend = Arc::new(MemoryBackend::new());
    let mut log = OperationLog::open(Arc::clone(&backend)).unwrap();
    let summary = Pipeline::new(
        config(&link_root, path_length(&base) + 40),
        Arc::new(DryRunLinkCreator::new()),
    )
    .run(temp.path(), &mut log)
    .await
    .unwrap();

    assert_eq!(summary.linked, 1);
    assert!(!link_root.exists());
    assert_eq!(backend.document().unwrap().operations.len(), 1);
}

#[tokio::test]
async fn test_store_failure_aborts_run() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    fs::create_dir(base.join(long_name("failure"))).unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let mut log = OperationLog::open(Arc::clone(&backend)).unwrap();
    backend.set_fail_writes(true);

    let creator = Arc::new(MemoryLinkCreator::new());
    let err = Pipeline::new(config(Path::new("/links"), path_length(&base) + 40), creator.clone())
        .run(temp.path(), &mut log)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Store(_)));
    assert_eq!(creator.link_count(), 0);
    assert!(log.scan_records().is_empty());
}

#[tokio::test]
async fn test_missing_root_is_scan_error() {
    let temp = TempDir::new().unwrap();
    let mut log = OperationLog::in_memory();
    let err = Pipeline::new(
        config(Path::new("/links"), 100),
        Arc::new(MemoryLinkCreator::new()),
    )
    .run(&temp.path().join("missing"), &mut log)
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Scan(_)));
}

#[tokio::test]
async fn test_cancelled_run_records_nothing() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    fs::create_dir(base.join(long_name("cancel"))).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut log = OperationLog::in_memory();
    let summary = Pipeline::new(
        config(Path::new("/links"), path_length(&base) + 40),
        Arc::new(MemoryLinkCreator::new()),
    )
    .with_cancellation(cancel)
    .run(temp.path(), &mut log)
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.scanned, 0);
    assert!(log.operations().is_empty());
}

#[tokio::test]
async fn test_rerun_adopts_alias_from_crashed_run() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    let source = base.join(long_name("crash"));
    fs::create_dir(&source).unwrap();

    // The alias was created but the run died before recording the outcome.
    let creator = Arc::new(MemoryLinkCreator::new());
    let name = generate(&source, 8, 12).unwrap();
    let alias = Path::new("/links").join(name.name.as_str());
    let mut log = OperationLog::in_memory();
    let op = Operation::create_link(&source, &alias, LinkType::Junction);
    log.append_operation(op.clone()).unwrap();
    creator.create_junction(&alias, &source).unwrap();

    let summary = Pipeline::new(config(Path::new("/links"), path_length(&base) + 40), creator.clone())
        .run(temp.path(), &mut log)
        .await
        .unwrap();

    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.already_linked, 1);
    assert_eq!(summary.linked, 0);
    assert_eq!(creator.link_count(), 1);
    assert_eq!(log.operations().len(), 1);
    assert_eq!(log.operation(op.id).unwrap().status, OperationStatus::Success);

    let rollback = RollbackEngine::new(creator.clone())
        .rollback_all(&mut log)
        .await
        .unwrap();
    assert_eq!(rollback.rolled_back, 1);
    assert_eq!(creator.link_count(), 0);
}

#[tokio::test]
async fn test_rerun_relinks_after_crash_before_link() {
    let temp = TempDir::new().unwrap();
    let base = std::path::absolute(temp.path()).unwrap();
    let source = base.join(long_name("early"));
    fs::create_dir(&source).unwrap();

    let creator = Arc::new(MemoryLinkCreator::new());
    let name = generate(&source, 8, 12).unwrap();
    let alias = Path::new("/links").join(name.name.as_str());
    let mut log = OperationLog::in_memory();
    let op = Operation::create_link(&source, &alias, LinkType::Junction);
    log.append_operation(op.clone()).unwrap();

    let summary = Pipeline::new(config(Path::new("/links"), path_length(&base) + 40), creator.clone())
        .run(temp.path(), &mut log)
        .await
        .unwrap();

    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.linked, 1);
    let stale = log.operation(op.id).unwrap();
    assert_eq!(stale.status, OperationStatus::Failed);
    assert_eq!(stale.error_message.as_deref(), Some(INTERRUPTED));
    assert_eq!(log.active_mapping_for(&source).unwrap().short_path, alias);
}
