use datalens_server::cache::FreshnessCache;
use datalens_server::error::ServerError;
use datalens_store::{DatasetStore, FsDatasetStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SALES_CSV: &[u8] = b"date,region,revenue\n2024-01-01,EU,100\n2024-01-02,US,250\n";

async fn cache_over_store(ttl: Duration) -> (Arc<FreshnessCache>, Arc<FsDatasetStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsDatasetStore::new(dir.path()).await.unwrap());
    let cache = Arc::new(FreshnessCache::new(store.clone(), ttl));
    (cache, store, dir)
}

#[tokio::test]
async fn second_read_within_ttl_reuses_the_parse() {
    let (cache, store, _dir) = cache_over_store(Duration::from_secs(300)).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();

    let first = cache.read("sales.csv").await.unwrap();
    let second = cache.read("sales.csv").await.unwrap();

    // Identical parse timestamp and exactly one reload: no re-parse happened
    assert_eq!(first.parsed_at, second.parsed_at);
    assert_eq!(cache.reload_count(), 1);
    assert!(Arc::ptr_eq(&first.frame, &second.frame));
}

#[tokio::test]
async fn read_after_ttl_produces_a_strictly_newer_parse() {
    // Zero TTL: every entry is stale by the time it is checked
    let (cache, store, _dir) = cache_over_store(Duration::ZERO).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();

    let first = cache.read("sales.csv").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = cache.read("sales.csv").await.unwrap();

    assert!(second.parsed_at > first.parsed_at);
    assert_eq!(cache.reload_count(), 2);
}

#[tokio::test]
async fn fresh_hit_updates_last_accessed_without_reload() {
    let (cache, store, _dir) = cache_over_store(Duration::from_secs(300)).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();

    cache.read("sales.csv").await.unwrap();
    let before = cache.last_accessed("sales.csv").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.read("sales.csv").await.unwrap();
    let after = cache.last_accessed("sales.csv").unwrap();

    assert!(after > before);
    assert_eq!(cache.reload_count(), 1);
}

#[tokio::test]
async fn missing_file_is_not_found_and_nothing_is_cached() {
    let (cache, _store, _dir) = cache_over_store(Duration::from_secs(300)).await;

    let err = cache.read("ghost.csv").await.unwrap_err();
    assert!(matches!(err, ServerError::NotFound(_)));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn parse_failure_propagates_and_creates_no_entry() {
    let (cache, _store, dir) = cache_over_store(Duration::from_secs(300)).await;
    // A file that appeared without upload and cannot be parsed
    std::fs::write(dir.path().join("bad.xlsx"), b"not a workbook").unwrap();

    let err = cache.read("bad.xlsx").await.unwrap_err();
    assert!(matches!(err, ServerError::Execution(_)));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn remove_deletes_entry_and_backing_file_together() {
    let (cache, store, dir) = cache_over_store(Duration::from_secs(300)).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();
    cache.read("sales.csv").await.unwrap();

    cache.remove("sales.csv").await.unwrap();

    assert!(cache.is_empty());
    assert!(!dir.path().join("sales.csv").exists());
    assert!(matches!(
        cache.read("sales.csv").await,
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test]
async fn reload_is_derived_from_current_bytes_after_eviction() {
    let (cache, store, _dir) = cache_over_store(Duration::from_secs(300)).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();
    let first = cache.read("sales.csv").await.unwrap();
    assert_eq!(first.frame.row_count(), 2);

    // Overwrite and evict, the way the server does on re-upload
    store
        .upload("sales.csv", b"a,b\n1,2\n3,4\n5,6\n", None)
        .await
        .unwrap();
    cache.evict("sales.csv").await;

    let second = cache.read("sales.csv").await.unwrap();
    assert_eq!(second.frame.row_count(), 3);
    assert_eq!(second.frame.columns(), &["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn concurrent_reads_of_one_file_parse_once() {
    let (cache, store, _dir) = cache_over_store(Duration::from_secs(300)).await;
    store.upload("sales.csv", SALES_CSV, None).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read("sales.csv").await.unwrap().parsed_at })
        })
        .collect();

    let mut stamps = Vec::new();
    for task in tasks {
        stamps.push(task.await.unwrap());
    }

    // Check-then-reload is serialized per key: every reader saw the same parse
    assert!(stamps.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(cache.reload_count(), 1);
}

#[tokio::test]
async fn concurrent_reads_of_distinct_files_do_not_corrupt_entries() {
    let (cache, store, _dir) = cache_over_store(Duration::from_secs(300)).await;

    let workers = 8;
    for i in 0..workers {
        let body = format!("id,value\n{},{}\n", i, i * 10);
        store
            .upload(&format!("file-{}.csv", i), body.as_bytes(), None)
            .await
            .unwrap();
    }

    let tasks: Vec<_> = (0..workers)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let snapshot = cache.read(&format!("file-{}.csv", i)).await.unwrap();
                snapshot.frame.rows()[0][1].clone()
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let value = task.await.unwrap();
        assert_eq!(value, datalens_frame::Value::Int((i * 10) as i64));
    }
    assert_eq!(cache.len(), workers);
    assert_eq!(cache.reload_count(), workers as u64);
}
