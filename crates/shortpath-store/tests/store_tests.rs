//! Integration tests for shortpath-store.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use shortpath_core::{LinkType, ObjectKind, Operation, OperationStatus, PathMapping, ScanRecord};
use shortpath_store::{
    JsonFileBackend, MemoryBackend, OperationLog, SCHEMA_VERSION, StoreBackend, StoreDocument,
    StoreError,
};
use tempfile::TempDir;

fn linked(log: &mut OperationLog, source: &str, target: &str) -> Operation {
    let op = Operation::create_link(source, target, LinkType::SymbolicLink);
    log.append_operation(op.clone()).unwrap();
    let op = log
        .update_operation_status(op.id, OperationStatus::Success, None)
        .unwrap();
    log.append_path_mapping(PathMapping::new(&op, "00ff")).unwrap();
    op
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operations.json");

    let op = {
        let mut log = OperationLog::open_file(&path).unwrap();
        log.append_scan_record(ScanRecord::new("/deep/a", ObjectKind::Directory))
            .unwrap();
        linked(&mut log, "/deep/a", "/links/a_00ff")
    };

    let log = OperationLog::open_file(&path).unwrap();
    assert_eq!(log.scan_records().len(), 1);
    assert_eq!(log.operation(op.id).unwrap().status, OperationStatus::Success);
    assert_eq!(
        log.active_mapping_for(Path::new("/deep/a"))
            .unwrap()
            .short_path,
        Path::new("/links/a_00ff")
    );
}

#[test]
fn test_persisted_json_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operations.json");
    let mut log = OperationLog::open_file(&path).unwrap();
    linked(&mut log, "/deep/a", "/links/a_00ff");

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(json["operations"].is_array());
    assert!(json["pathMappings"].is_array());
    assert!(json["scanRecords"].is_array());
    assert_eq!(json["metadata"]["schemaVersion"], SCHEMA_VERSION);
    assert_eq!(json["operations"][0]["status"], "Success");
    assert!(json["operations"][0].get("errorMessage").is_none());
}

#[test]
fn test_corrupt_store_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("operations.json");
    fs::write(&path, b"\x00\x01garbage").unwrap();

    let mut log = OperationLog::open_file(&path).unwrap();
    assert!(log.operations().is_empty());

    let quarantined: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(fs::read(quarantined[0].path()).unwrap(), b"\x00\x01garbage");

    // The fresh log is writable at the original location.
    linked(&mut log, "/deep/a", "/links/a_00ff");
    assert!(path.exists());
}

#[test]
fn test_newer_schema_is_refused() {
    let mut doc = StoreDocument::new();
    doc.metadata.schema_version = SCHEMA_VERSION + 1;
    let backend = MemoryBackend::with_document(doc);

    let err = OperationLog::open(backend).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedSchema { .. }));
}

#[test]
fn test_failed_persist_keeps_previous_state() {
    let backend = Arc::new(MemoryBackend::new());
    let mut log = OperationLog::open(Arc::clone(&backend)).unwrap();
    let op = Operation::create_link("/deep/a", "/links/a_1", LinkType::Junction);
    log.append_operation(op.clone()).unwrap();

    backend.set_fail_writes(true);
    let err = log
        .update_operation_status(op.id, OperationStatus::Success, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    // Neither the log nor the backend saw the change.
    assert_eq!(
        log.operation(op.id).unwrap().status,
        OperationStatus::InProgress
    );
    let durable = backend.document().unwrap();
    assert_eq!(durable.operations[0].status, OperationStatus::InProgress);

    backend.set_fail_writes(false);
    log.update_operation_status(op.id, OperationStatus::Success, None)
        .unwrap();
    assert_eq!(
        backend.document().unwrap().operations[0].status,
        OperationStatus::Success
    );
}

#[test]
fn test_last_updated_is_monotonic() {
    let mut log = OperationLog::in_memory();
    let mut previous = log.metadata().last_updated_at;
    for i in 0..20 {
        log.append_scan_record(ScanRecord::new(format!("/deep/{i}"), ObjectKind::File))
            .unwrap();
        let current = log.metadata().last_updated_at;
        assert!(current >= previous);
        previous = current;
    }
    assert!(log.metadata().created_at <= previous);
}

#[test]
fn test_rollback_history_is_kept() {
    let mut log = OperationLog::in_memory();
    let first = linked(&mut log, "/deep/a", "/links/a_1");
    log.update_operation_status(first.id, OperationStatus::RolledBack, None)
        .unwrap();
    let second = linked(&mut log, "/deep/a", "/links/a_2");

    assert_eq!(log.path_mappings().len(), 2);
    let active = log.active_mapping_for(Path::new("/deep/a")).unwrap();
    assert_eq!(active.operation_id, second.id);
    assert_eq!(log.operations_with_status(OperationStatus::RolledBack).len(), 1);
}

#[test]
fn test_file_backend_describe() {
    let backend = JsonFileBackend::new("/var/lib/shortpath/operations.json");
    assert!(backend.describe().ends_with("operations.json"));
}
