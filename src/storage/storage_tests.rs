use super::*;
use crate::error::StoreError;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn rec(v: JsonValue) -> Record { v.as_object().cloned().unwrap() }

fn memory_store() -> (Arc<MemoryBackend>, TableStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = TableStore::new(backend.clone());
    (backend, store)
}

#[test]
fn test_never_written_table_is_empty() {
    let (_b, store) = memory_store();
    assert!(store.table("hero").unwrap().get_all().unwrap().is_empty());
    let err = store.table("hero").unwrap().get_by_id(&RecordId::Int(1)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_first_write_materializes_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(tmp.path()).unwrap());
    let store = TableStore::new(backend.clone());
    assert!(!backend.snapshot_path("note").exists());
    store.table("note").unwrap().upsert(rec(json!({"id": 1, "text": "hi"}))).unwrap();
    assert!(backend.snapshot_path("note").exists());
}

#[test]
fn test_upsert_is_idempotent() {
    let (_b, store) = memory_store();
    let t = store.table("hero").unwrap();
    t.upsert(rec(json!({"id": 11, "name": "Mr. Nice"}))).unwrap();
    let r = rec(json!({"id": 12, "name": "Narco"}));
    t.upsert(r.clone()).unwrap();
    let once = t.get_all().unwrap();
    t.upsert(r).unwrap();
    assert_eq!(t.get_all().unwrap(), once);
}

#[test]
fn test_replace_not_merge() {
    let (_b, store) = memory_store();
    let t = store.table("contact").unwrap();
    t.upsert(rec(json!({"id": 1, "a": 1}))).unwrap();
    t.upsert(rec(json!({"id": 1, "b": 2}))).unwrap();
    assert_eq!(t.get_by_id(&RecordId::Int(1)).unwrap(), rec(json!({"id": 1, "b": 2})));
    assert_eq!(t.get_all().unwrap().len(), 1);
}

#[test]
fn test_replace_keeps_position() {
    let (_b, store) = memory_store();
    let t = store.table("hero").unwrap();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        t.upsert(rec(json!({"id": id, "name": name}))).unwrap();
    }
    t.upsert(rec(json!({"id": 2, "name": "B"}))).unwrap();
    let names: Vec<String> = t.get_all().unwrap().iter().map(|r| r["name"].as_str().unwrap().to_string()).collect();
    assert_eq!(names, vec!["a", "B", "c"]);
}

#[test]
fn test_append_on_new_id_preserves_prior_records() {
    let (_b, store) = memory_store();
    let t = store.table("note").unwrap();
    t.upsert(rec(json!({"id": 1, "text": "one"}))).unwrap();
    t.upsert(rec(json!({"id": "two", "text": "two"}))).unwrap();
    let before = t.get_all().unwrap();
    t.upsert(rec(json!({"id": 3, "text": "three"}))).unwrap();
    let after = t.get_all().unwrap();
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(after.last().unwrap()["text"], "three");
}

#[test]
fn test_ids_stay_unique_across_mixed_id_types() {
    let (_b, store) = memory_store();
    let t = store.table("crisis").unwrap();
    t.upsert(rec(json!({"id": 5, "v": 1}))).unwrap();
    t.upsert(rec(json!({"id": "5", "v": 2}))).unwrap();
    t.upsert(rec(json!({"id": 5.0, "v": 3}))).unwrap();
    t.upsert(rec(json!({"id": "x", "v": 4}))).unwrap();
    let all = t.get_all().unwrap();
    assert_eq!(all.len(), 2);
    let mut ids: Vec<RecordId> = all.iter().map(|r| RecordId::of(r).unwrap()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 2);
    assert_eq!(t.get_by_id(&RecordId::parse("5")).unwrap()["v"], 3);
}

#[test]
fn test_upsert_collapses_duplicates_from_hand_edited_snapshot() {
    let seeded = vec![rec(json!({"id": 1, "v": "a"})), rec(json!({"id": 2})), rec(json!({"id": 1, "v": "b"}))];
    let backend = Arc::new(MemoryBackend::new().with_table("claim", &seeded));
    let store = TableStore::new(backend);
    let t = store.table("claim").unwrap();
    t.upsert(rec(json!({"id": 1, "v": "c"}))).unwrap();
    assert_eq!(t.get_all().unwrap(), vec![rec(json!({"id": 1, "v": "c"})), rec(json!({"id": 2}))]);
}

#[test]
fn test_out_of_range_id_does_not_replace_i64_max() {
    let (_b, store) = memory_store();
    let t = store.table("hero").unwrap();
    let max: Record = serde_json::from_str(r#"{"id": 9223372036854775807, "n": "max"}"#).unwrap();
    let over: Record = serde_json::from_str(r#"{"id": 9223372036854775808, "n": "bigger"}"#).unwrap();
    t.upsert(max.clone()).unwrap();
    let err = t.upsert(over).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
    assert_eq!(t.get_all().unwrap(), vec![max.clone()]);
    assert_eq!(t.get_by_id(&RecordId::Int(i64::MAX)).unwrap(), max);
}

#[test]
fn test_upsert_requires_id() {
    let (backend, store) = memory_store();
    let err = store.table("hero").unwrap().upsert(rec(json!({"name": "no id"}))).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
    let err = store.table("hero").unwrap().upsert(rec(json!({"id": null}))).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
    assert!(backend.table_names().is_empty());
}

#[test]
fn test_rejects_unsafe_table_names() {
    let (_b, store) = memory_store();
    for bad in ["", "../etc", "a/b", ".hidden", "sp ace", "x.json"] {
        assert!(matches!(store.table(bad).err(), Some(StoreError::InvalidTableName(_))), "{bad}");
    }
    assert!(store.table("claimRebuttal").is_ok());
    assert!(store.table("claim-rebuttal").is_ok());
}

#[test]
fn test_failed_write_keeps_previous_snapshot() {
    let (backend, store) = memory_store();
    let t = store.table("hero").unwrap();
    t.upsert(rec(json!({"id": 1, "name": "before"}))).unwrap();
    let committed = t.get_all().unwrap();

    backend.fail_next_writes(1);
    let err = t.upsert(rec(json!({"id": 1, "name": "after"}))).unwrap_err();
    assert!(matches!(err, StoreError::Persistence { .. }));
    let err = {
        backend.fail_next_writes(1);
        t.upsert(rec(json!({"id": 2, "name": "new"}))).unwrap_err()
    };
    assert!(matches!(err, StoreError::Persistence { .. }));
    assert_eq!(t.get_all().unwrap(), committed);
}

#[test]
fn test_corrupt_snapshot_is_not_treated_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileBackend::new(tmp.path()).unwrap());
    std::fs::write(backend.snapshot_path("hero"), b"not json").unwrap();
    let store = TableStore::new(backend.clone());
    let t = store.table("hero").unwrap();
    assert!(matches!(t.get_all().unwrap_err(), StoreError::Corrupt { .. }));
    // An upsert must not clobber the unreadable snapshot.
    assert!(t.upsert(rec(json!({"id": 1}))).is_err());
    assert_eq!(std::fs::read(backend.snapshot_path("hero")).unwrap(), b"not json");
}

#[test]
fn test_concurrent_upserts_same_table_lose_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = TableStore::new(Arc::new(FileBackend::new(tmp.path()).unwrap()));
    let threads: Vec<_> = (0..8)
        .map(|w| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    let id = w * 100 + i;
                    store.table("note").unwrap().upsert(rec(json!({"id": id, "worker": w}))).unwrap();
                }
            })
        })
        .collect();
    for t in threads { t.join().unwrap(); }
    let all = store.table("note").unwrap().get_all().unwrap();
    assert_eq!(all.len(), 80);
    for w in 0..8 {
        for i in 0..10 {
            assert!(store.table("note").unwrap().get_by_id(&RecordId::Int(w * 100 + i)).is_ok());
        }
    }
}

#[test]
fn test_tables_are_independent() {
    let (_b, store) = memory_store();
    let hero = store.table("hero").unwrap();
    let note = store.table("note").unwrap();
    hero.upsert(rec(json!({"id": 1, "name": "h"}))).unwrap();
    note.upsert(rec(json!({"id": 1, "text": "n"}))).unwrap();
    assert_eq!(hero.get_by_id(&RecordId::Int(1)).unwrap()["name"], "h");
    assert_eq!(note.get_by_id(&RecordId::Int(1)).unwrap()["text"], "n");
}

#[test]
fn test_table_locks_are_per_name() {
    let locks = TableLocks::default();
    let a1 = locks.for_table("a");
    let a2 = locks.for_table("a");
    let b = locks.for_table("b");
    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    let _held = a1.lock();
    assert!(b.try_lock().is_some());
    assert!(a2.try_lock().is_none());
}
