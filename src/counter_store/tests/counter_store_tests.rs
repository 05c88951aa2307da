use super::*;
use crate::services::{ManualClock, SyncClock};
use crate::testing::FailingBackend;
use tempfile::tempdir;

const MAX: u32 = 6;

fn store_with(backend: Arc<dyn StorageBackend>) -> (CounterStore, ManualClock) {
    let clock = ManualClock::default();
    let store = CounterStore::new(backend, MAX, Arc::new(clock.clone()));
    (store, clock)
}

#[test]
fn test_read_without_stored_state_is_fresh() {
    let (store, _) = store_with(Arc::new(MemoryBackend::new()));
    let state = store.read();
    assert_eq!(state, QuotaState::fresh(MAX));
    assert_eq!(state.remaining(), MAX);
}

#[test]
fn test_write_clamps_and_stamps_sync_time() {
    let (store, clock) = store_with(Arc::new(MemoryBackend::new()));

    let state = store.write(99);

    assert_eq!(state.count, MAX);
    assert_eq!(state.last_sync_at, Some(clock.now()));
    assert_eq!(store.read(), state);
}

#[test]
fn test_increment_saturates_and_keeps_sync_time() {
    let (store, clock) = store_with(Arc::new(MemoryBackend::new()));
    store.write(4);
    let synced_at = clock.now();
    clock.advance(chrono::Duration::seconds(30));

    assert_eq!(store.increment().count, 5);
    assert_eq!(store.increment().count, 6);
    let state = store.increment();

    assert_eq!(state.count, MAX);
    assert_eq!(state.last_sync_at, Some(synced_at));
}

#[test]
fn test_increment_from_empty_leaves_sync_time_unset() {
    let (store, _) = store_with(Arc::new(MemoryBackend::new()));
    let state = store.increment();
    assert_eq!(state.count, 1);
    assert!(state.last_sync_at.is_none());
}

#[test]
fn test_clear_resets_to_fresh() {
    let (store, _) = store_with(Arc::new(MemoryBackend::new()));
    store.write(3);
    store.clear();
    assert_eq!(store.read(), QuotaState::fresh(MAX));
}

#[test]
fn test_corrupt_payload_reads_as_fresh() {
    let backend = Arc::new(MemoryBackend::new());
    backend.save(COUNTER_KEY, "{not json").unwrap();
    let (store, _) = store_with(backend);

    assert_eq!(store.read().count, 0);
    assert!(!store.is_degraded());
}

#[test]
fn test_stored_count_above_max_is_clamped_on_read() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .save(COUNTER_KEY, r#"{"count":40,"lastSyncAt":null}"#)
        .unwrap();
    let (store, _) = store_with(backend);

    assert_eq!(store.read().count, MAX);
}

#[test]
fn test_persisted_format_uses_camel_case_keys() {
    let backend = Arc::new(MemoryBackend::new());
    let (store, _) = store_with(backend.clone());
    store.write(2);

    let raw = backend.load(COUNTER_KEY).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(value["count"], 2);
    assert!(value["lastSyncAt"].is_string());
}

#[test]
fn test_failing_backend_degrades_to_session_memory() {
    let (store, _) = store_with(Arc::new(FailingBackend));

    assert_eq!(store.read().count, 0);
    assert!(store.is_degraded());

    store.write(2);
    store.increment();
    assert_eq!(store.read().count, 3);

    store.clear();
    assert_eq!(store.read().count, 0);
}

#[test]
fn test_file_backend_survives_new_store_instance() {
    let dir = tempdir().unwrap();
    let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path().join("store")));
    let (store, _) = store_with(backend.clone());
    store.write(1);
    store.increment();

    let (reopened, _) = store_with(backend);
    assert_eq!(reopened.read().count, 2);
    assert!(dir.path().join("store").join("anonymous-quota.json").exists());
}

#[test]
fn test_file_backend_remove_missing_key_is_ok() {
    let dir = tempdir().unwrap();
    let backend = FileBackend::new(dir.path().to_path_buf());
    assert!(backend.remove(COUNTER_KEY).is_ok());
    assert_eq!(backend.load(COUNTER_KEY).unwrap(), None);
}

#[test]
fn test_file_backend_unwritable_directory_degrades() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let (store, _) = store_with(Arc::new(FileBackend::new(blocker.join("store"))));

    store.write(4);

    assert!(store.is_degraded());
    assert_eq!(store.read().count, 4);
}
