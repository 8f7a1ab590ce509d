use std::fs;

use klinesync::{CacheIndex, INDEX_FILE};
use klinesync_core::{CacheStatus, Resolution, SyncError};
use klinesync_mock::fixtures::key;

#[test]
fn staged_entries_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("BTCUSDT", Resolution::M15);
    {
        let mut index = CacheIndex::open(dir.path()).unwrap();
        let entry = index.stage(&k, 3, b"PAR1-artifact").unwrap();
        assert_eq!(entry.filename, "BTC_15m.parquet");
        assert_eq!(entry.filepath, dir.path().join("BTCUSDT").join("BTC_15m.parquet"));
        assert_eq!(entry.status, CacheStatus::Pending);
        assert!(entry.filepath.exists());
    }
    assert!(dir.path().join(INDEX_FILE).exists());

    let index = CacheIndex::open(dir.path()).unwrap();
    assert_eq!(index.len(), 1);
    let entry = index.get(&k).unwrap();
    assert_eq!(entry.rows, 3);
    assert!(entry.is_pending());
}

#[test]
fn restaging_a_pair_replaces_its_entry() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("ETHUSDT", Resolution::H1);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    index.stage(&k, 3, b"one").unwrap();
    index.mark_uploaded(&k).unwrap();
    index.stage(&k, 5, b"two").unwrap();

    assert_eq!(index.len(), 1);
    let entry = index.get(&k).unwrap();
    assert_eq!(entry.rows, 5);
    assert!(entry.is_pending());
    assert_eq!(fs::read(&entry.filepath).unwrap(), b"two");
}

#[test]
fn corrupt_index_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(INDEX_FILE), b"{ not json").unwrap();
    let index = CacheIndex::open(dir.path()).unwrap();
    assert!(index.is_empty());
}

#[test]
fn legacy_index_records_load_as_pending() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("BTCUSDT").join("BTC_15m.parquet");
    fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    fs::write(&artifact, b"12345").unwrap();
    let legacy = serde_json::json!({
        "BTCUSDT_15m": {
            "filename": "BTC_15m.parquet",
            "symbol": "BTCUSDT",
            "timeframe": "15m",
            "rows": 42,
            "status": "cached",
            "filepath": artifact,
        }
    });
    fs::write(dir.path().join(INDEX_FILE), legacy.to_string()).unwrap();

    let index = CacheIndex::open(dir.path()).unwrap();
    let pending = index.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key(), key("BTCUSDT", Resolution::M15));
    let stats = index.stats();
    assert_eq!(stats.pending_rows, 42);
    assert_eq!(stats.pending_bytes, 5);
}

#[test]
fn cleanup_reclaims_only_uploaded_entries() {
    let dir = tempfile::tempdir().unwrap();
    let done = key("BTCUSDT", Resolution::M15);
    let waiting = key("ETHUSDT", Resolution::M15);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    index.stage(&done, 1, b"a").unwrap();
    index.stage(&waiting, 1, b"b").unwrap();
    index.mark_uploaded(&done).unwrap();

    let stats = index.stats();
    assert_eq!((stats.pending, stats.uploaded), (1, 1));

    assert_eq!(index.cleanup_uploaded().unwrap(), 1);
    assert!(index.get(&done).is_none());
    assert!(!dir.path().join("BTCUSDT").exists());
    assert!(index.get(&waiting).unwrap().filepath.exists());

    let reopened = CacheIndex::open(dir.path()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(index.cleanup_uploaded().unwrap(), 0);
}

#[test]
fn remove_artifact_leaves_pending_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("SOLUSDT", Resolution::H4);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    let entry = index.stage(&k, 1, b"x").unwrap();

    index.remove_artifact(&k).unwrap();
    assert!(entry.filepath.exists());

    index.mark_uploaded(&k).unwrap();
    index.remove_artifact(&k).unwrap();
    assert!(!entry.filepath.exists());
    assert_eq!(index.get(&k).unwrap().status, CacheStatus::Uploaded);
}

#[test]
fn marking_an_unknown_pair_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = CacheIndex::open(dir.path()).unwrap();
    let err = index
        .mark_uploaded(&key("XRPUSDT", Resolution::D1))
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
}

/// Make every index save fail by occupying the temporary file's path.
fn block_saves(root: &std::path::Path) -> std::path::PathBuf {
    let blocker = root.join(INDEX_FILE).with_extension("json.tmp");
    fs::create_dir(&blocker).unwrap();
    blocker
}

#[test]
fn failed_save_undoes_a_fresh_stage() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("BTCUSDT", Resolution::M15);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    block_saves(dir.path());

    let err = index.stage(&k, 3, b"PAR1").unwrap_err();
    assert!(matches!(err, SyncError::Io(_)));
    assert!(index.get(&k).is_none());
    assert!(index.pending().is_empty());
    assert!(!index.artifact_path(&k).exists());
}

#[test]
fn failed_save_keeps_the_previous_entry_on_restage() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("ETHUSDT", Resolution::H1);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    index.stage(&k, 3, b"one").unwrap();
    index.mark_uploaded(&k).unwrap();
    block_saves(dir.path());

    assert!(index.stage(&k, 5, b"two").is_err());
    let entry = index.get(&k).unwrap();
    assert_eq!(entry.rows, 3);
    assert_eq!(entry.status, CacheStatus::Uploaded);
}

#[test]
fn failed_save_leaves_the_entry_pending() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("SOLUSDT", Resolution::M15);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    index.stage(&k, 1, b"x").unwrap();
    let blocker = block_saves(dir.path());

    let err = index.mark_uploaded(&k).unwrap_err();
    assert!(matches!(err, SyncError::Io(_)));
    assert!(index.get(&k).unwrap().is_pending());
    assert_eq!(index.stats().pending, 1);

    fs::remove_dir(blocker).unwrap();
    index.mark_uploaded(&k).unwrap();
    let reopened = CacheIndex::open(dir.path()).unwrap();
    assert_eq!(reopened.get(&k).unwrap().status, CacheStatus::Uploaded);
}

#[test]
fn failed_save_keeps_uploaded_entries_for_the_next_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("ADAUSDT", Resolution::H1);
    let mut index = CacheIndex::open(dir.path()).unwrap();
    index.stage(&k, 1, b"x").unwrap();
    index.mark_uploaded(&k).unwrap();
    let blocker = block_saves(dir.path());

    assert!(index.cleanup_uploaded().is_err());
    assert_eq!(index.len(), 1);

    fs::remove_dir(blocker).unwrap();
    assert_eq!(index.cleanup_uploaded().unwrap(), 1);
    assert!(CacheIndex::open(dir.path()).unwrap().is_empty());
}
