//! Index creation, configuration listeners and drops against the in-memory
//! backend.

mod common;

use async_trait::async_trait;
use common::MemoryBackend;
use docsearch::backends::SearchBackend;
use docsearch::config::IndexSettings;
use docsearch::index::{IndexConfigurationListener, IndexManager, MappingDirListener};
use docsearch::{Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

#[async_trait]
impl IndexConfigurationListener for CountingListener {
    async fn on_index_created(&self, _backend: &dyn SearchBackend, _index: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingListener;

#[async_trait]
impl IndexConfigurationListener for FailingListener {
    async fn on_index_created(&self, _backend: &dyn SearchBackend, index: &str) -> Result<()> {
        Err(Error::Backend {
            index: index.to_string(),
            status: 400,
            reason: "mapper_parsing_exception".to_string(),
        })
    }
}

type Listener = Arc<dyn IndexConfigurationListener>;

fn manager(
    backend: &Arc<MemoryBackend>,
    listeners: Vec<Listener>,
) -> IndexManager {
    IndexManager::new(backend.clone(), IndexSettings::default(), listeners)
}

// ── ensure_index ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ensure_index_creates_once() {
    let backend = Arc::new(MemoryBackend::new());
    let listener = Arc::new(CountingListener::default());
    let manager = manager(&backend, vec![listener.clone() as Listener]);

    assert!(manager.ensure_index("studies").await.unwrap());
    assert!(!manager.ensure_index("studies").await.unwrap());

    assert_eq!(backend.create_calls(), 1);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    assert!(manager.has_index("studies").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_ensure_index_creates_once() {
    let backend = Arc::new(MemoryBackend::new());
    backend.delay_create(Duration::from_millis(20));
    let listener = Arc::new(CountingListener::default());
    let manager = Arc::new(manager(&backend, vec![listener.clone() as Listener]));

    let tasks = (0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.ensure_index("networks").await }
    });
    let results = futures::future::join_all(tasks).await;

    let created = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|created| *created)
        .count();
    assert_eq!(created, 1);
    assert_eq!(backend.create_calls(), 1);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_indices_do_not_block_each_other() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = Arc::new(manager(&backend, vec![]));

    let (a, b) = tokio::join!(
        manager.ensure_index("studies"),
        manager.ensure_index("datasets")
    );
    assert!(a.unwrap());
    assert!(b.unwrap());
    assert_eq!(backend.create_calls(), 2);
}

#[tokio::test]
async fn test_listener_failure_is_configuration_error() {
    let backend = Arc::new(MemoryBackend::new());
    let after = Arc::new(CountingListener::default());
    let manager = manager(&backend, vec![Arc::new(FailingListener) as Listener, after.clone()]);

    let err = manager.ensure_index("studies").await.unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {err:?}");
    // Later listeners are not run and the index is rolled back
    assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    assert!(!backend.has("studies"));
}

#[tokio::test]
async fn test_create_failure_propagates() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_create();
    let manager = manager(&backend, vec![]);

    let err = manager.ensure_index("studies").await.unwrap_err();
    assert!(matches!(err, Error::Backend { status: 500, .. }));
}

// ── drop_index ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drop_absent_index_is_noop() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(&backend, vec![]);

    manager.drop_index("missing").await.unwrap();
    assert_eq!(backend.calls_to("delete_index"), 1);
}

#[tokio::test]
async fn test_drop_then_recreate() {
    let backend = Arc::new(MemoryBackend::new());
    let listener = Arc::new(CountingListener::default());
    let manager = manager(&backend, vec![listener.clone() as Listener]);

    manager.ensure_index("studies").await.unwrap();
    manager.drop_index("studies").await.unwrap();
    assert!(!manager.has_index("studies").await.unwrap());

    assert!(manager.ensure_index("studies").await.unwrap());
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
}

// ── Mappings ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mapping_dir_listener_applies_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("studies.json"),
        json!({"mappings": {"properties": {"acronym": {"type": "keyword"}}}}).to_string(),
    )
    .unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(&backend, vec![Arc::new(MappingDirListener::new(dir.path())) as Listener]);

    manager.ensure_index("studies").await.unwrap();
    assert_eq!(
        backend.mapping("studies"),
        Some(json!({"properties": {"acronym": {"type": "keyword"}}}))
    );
}

#[tokio::test]
async fn test_mapping_dir_listener_skips_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(&backend, vec![Arc::new(MappingDirListener::new(dir.path())) as Listener]);

    assert!(manager.ensure_index("datasets").await.unwrap());
    assert_eq!(backend.calls_to("put_mapping"), 0);
}

#[tokio::test]
async fn test_mapping_dir_listener_invalid_json_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("studies.json"), "{ not json").unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(&backend, vec![Arc::new(MappingDirListener::new(dir.path())) as Listener]);

    let err = manager.ensure_index("studies").await.unwrap_err();
    assert!(err.is_configuration());
    assert!(!backend.has("studies"));
}

#[tokio::test]
async fn test_field_mapping() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(&backend, vec![]);

    // Absent index: empty mapping, no error
    let mapping = manager.field_mapping("studies").await.unwrap();
    assert!(!mapping.is_analyzed("name"));

    manager.ensure_index("studies").await.unwrap();
    backend.set_mapping(
        "studies",
        json!({"properties": {"name": {"type": "keyword", "fields": {"analyzed": {"type": "text"}}}}}),
    );
    let mapping = manager.field_mapping("studies").await.unwrap();
    assert!(mapping.is_analyzed("name"));
}
