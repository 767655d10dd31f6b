//! Durability tests for file-backed engines.
//!
//! Each test writes through one engine instance, drops it, and re-creates an
//! engine at the same path. Configuration is not durable, so the scheme is
//! re-applied before records are read back.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{fs, path::Path};

use quill_store::{Engine, Error, SortOrder};
use tempfile::TempDir;

fn configure(engine: &Engine) {
    engine.set_string("db", "events").unwrap();
    engine.set_string("db.events.scheme", "seq").unwrap();
    engine.set_string("db.events.scheme.seq", "u64,key(0)").unwrap();
    engine.set_string("db.events.scheme", "body").unwrap();
    engine.set_string("db.events.scheme.body", "string").unwrap();
}

fn write_events(path: &Path, count: u64) {
    let engine = Engine::create(path).unwrap();
    configure(&engine);
    engine.open().unwrap();

    let events = engine.get_object("db.events").unwrap();
    let mut txn = engine.transaction().unwrap();
    for seq in 0..count {
        let mut record = events.document();
        record.set_int("seq", seq);
        record.set_string("body", format!("event-{seq}"));
        txn.set(&record).unwrap();
    }
    txn.commit().unwrap();
    engine.close().unwrap();
}

#[test]
fn test_committed_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 10);

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    engine.open().unwrap();

    let events = engine.get_object("db.events").unwrap();
    assert_eq!(events.len(), 10);

    let bodies: Vec<_> = events
        .cursor(SortOrder::Descending)
        .unwrap()
        .take(2)
        .map(|r| String::from_utf8(r.get_string("body").unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(bodies, vec!["event-9", "event-8"]);
}

#[test]
fn test_uncommitted_writes_are_lost() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 3);

    {
        let engine = Engine::create(dir.path()).unwrap();
        configure(&engine);
        engine.open().unwrap();
        let events = engine.get_object("db.events").unwrap();

        let mut txn = engine.transaction().unwrap();
        let mut record = events.document();
        record.set_int("seq", 99);
        txn.set(&record).unwrap();
        // Dropped without commit
    }

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    engine.open().unwrap();
    assert_eq!(engine.get_object("db.events").unwrap().len(), 3);
}

#[test]
fn test_corrupted_snapshot_is_detected() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 3);

    let snapshot = dir.path().join("events.qdb");
    let mut data = fs::read(&snapshot).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&snapshot, data).unwrap();

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    let err = engine.open().unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }), "unexpected error: {err}");
    assert!(!engine.is_open());
}

#[test]
fn test_truncated_snapshot_is_detected() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 3);

    let snapshot = dir.path().join("events.qdb");
    let data = fs::read(&snapshot).unwrap();
    fs::write(&snapshot, &data[..data.len() / 2]).unwrap();

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    assert!(matches!(engine.open(), Err(Error::Corrupted { .. })));
}

#[test]
fn test_key_fields_can_be_declared_before_open() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 2);

    // Records are only loaded on open, so a full scheme can be re-applied
    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    engine.open().unwrap();

    let events = engine.get_object("db.events").unwrap();
    assert_eq!(events.len(), 2);
    engine.set_string("db.events.scheme", "shard").unwrap();
    assert!(matches!(
        engine.set_string("db.events.scheme.shard", "u8,key(1)"),
        Err(Error::SchemeLocked { .. })
    ));
}

#[test]
fn test_database_defined_while_online_is_loaded() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 4);

    let engine = Engine::create(dir.path()).unwrap();
    engine.open().unwrap();
    engine.set_string("db", "events").unwrap();
    assert_eq!(engine.get_object("db.events").unwrap().len(), 4);

    // Existing records lock the key layout
    engine.set_string("db.events.scheme", "seq").unwrap();
    assert!(matches!(
        engine.set_string("db.events.scheme.seq", "u64,key(0)"),
        Err(Error::SchemeLocked { .. })
    ));
}

#[test]
fn test_ids_follow_definition_order_not_disk_state() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 1);

    let engine = Engine::create(dir.path()).unwrap();
    engine.set_string("db", "other").unwrap();
    configure(&engine);
    assert_eq!(engine.get_int("db.other.id"), Some(0));
    assert_eq!(engine.get_int("db.events.id"), Some(1));
    assert_eq!(engine.get_string("engine.path"), Some(dir.path().display().to_string()));
}

#[test]
fn test_failed_commit_leaves_records_unchanged() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 2);

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    engine.open().unwrap();
    let events = engine.get_object("db.events").unwrap();

    // A directory in place of the temporary snapshot makes the write fail
    let blocker = dir.path().join("events.qdb.tmp");
    fs::create_dir(&blocker).unwrap();

    let mut txn = engine.transaction().unwrap();
    let mut record = events.document();
    record.set_int("seq", 50);
    txn.set(&record).unwrap();
    assert!(matches!(txn.commit(), Err(Error::Io { .. })));

    assert_eq!(events.len(), 2);
    assert!(matches!(events.get(&record), Err(Error::KeyNotFound)));

    // The next commit must not carry the failed write to disk
    fs::remove_dir(&blocker).unwrap();
    let mut txn = engine.transaction().unwrap();
    let mut record = events.document();
    record.set_int("seq", 60);
    txn.set(&record).unwrap();
    txn.commit().unwrap();
    engine.close().unwrap();

    let engine = Engine::create(dir.path()).unwrap();
    configure(&engine);
    engine.open().unwrap();
    let seqs: Vec<_> = engine
        .get_object("db.events")
        .unwrap()
        .cursor(SortOrder::Ascending)
        .unwrap()
        .map(|r| r.get_int("seq").unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 60]);
}

#[test]
fn test_failed_commit_restores_other_databases() {
    let dir = TempDir::new().unwrap();
    write_events(dir.path(), 1);

    let engine = Engine::create(dir.path()).unwrap();
    engine.set_string("db", "audit").unwrap();
    engine.set_string("db.audit.scheme", "seq").unwrap();
    engine.set_string("db.audit.scheme.seq", "u64,key(0)").unwrap();
    configure(&engine);
    engine.open().unwrap();
    let audit = engine.get_object("db.audit").unwrap();
    let events = engine.get_object("db.events").unwrap();

    fs::create_dir(dir.path().join("events.qdb.tmp")).unwrap();

    // audit (id 0) is written before events (id 1) fails
    let mut txn = engine.transaction().unwrap();
    let mut entry = audit.document();
    entry.set_int("seq", 7);
    txn.set(&entry).unwrap();
    let mut record = events.document();
    record.set_int("seq", 8);
    txn.set(&record).unwrap();
    assert!(txn.commit().is_err());
    assert_eq!(audit.len(), 0);
    drop(engine);

    let engine = Engine::create(dir.path()).unwrap();
    engine.set_string("db", "audit").unwrap();
    engine.set_string("db.audit.scheme", "seq").unwrap();
    engine.set_string("db.audit.scheme.seq", "u64,key(0)").unwrap();
    engine.open().unwrap();
    assert_eq!(engine.get_object("db.audit").unwrap().len(), 0);
}
