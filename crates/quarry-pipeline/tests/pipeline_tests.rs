//! End-to-end pipeline tests over a fully wired context

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry_core::{compute_digest, ArtifactEvent, QuarryConfig, Repository, RepositoryEvent};
use quarry_pipeline::{
    ArtifactStore, MemoryArtifactStore, PipelineError, Quarry, QuarryBuilder, UploadRequest,
};
use quarry_plugin::{
    IntegrationPlugin, MemoryStorage, Plugin, PluginConfig, PluginError, PluginHandle,
    StoragePlugin,
};
use quarry_repo::{ResolveError, UpstreamFetcher, UpstreamResponse};

// ============ Test Doubles ============

struct FakeUpstream {
    objects: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl FakeUpstream {
    fn new(objects: &[(&str, &[u8])], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            objects: objects
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            fetches: AtomicUsize::new(0),
            delay,
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamFetcher for FakeUpstream {
    async fn fetch(&self, _base_url: &str, path: &str) -> quarry_repo::Result<UpstreamResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.objects.get(path) {
            Some(data) => Ok(UpstreamResponse::Found {
                data: data.clone(),
                checksum: Some(compute_digest(data)),
            }),
            None => Ok(UpstreamResponse::Missing),
        }
    }
}

struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Arc::new(Self { seen: seen.clone() }), seen)
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    async fn initialize(&self, _config: &PluginConfig) -> quarry_plugin::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> quarry_plugin::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl IntegrationPlugin for Recorder {
    async fn on_artifact_uploaded(&self, event: &ArtifactEvent) -> quarry_plugin::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("uploaded:{}", event.artifact.path));
        Ok(())
    }

    async fn on_artifact_deleted(&self, event: &ArtifactEvent) -> quarry_plugin::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("deleted:{}", event.artifact.path));
        Ok(())
    }

    async fn on_repository_created(&self, event: &RepositoryEvent) -> quarry_plugin::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("repo-created:{}", event.repository.name));
        Ok(())
    }
}

/// Storage whose deletes always fail, for exercising the double-fault path
struct StuckStorage {
    inner: MemoryStorage,
}

#[async_trait]
impl Plugin for StuckStorage {
    fn name(&self) -> &str {
        "stuck"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    async fn initialize(&self, _config: &PluginConfig) -> quarry_plugin::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> quarry_plugin::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StoragePlugin for StuckStorage {
    async fn upload(&self, path: &str, data: &[u8]) -> quarry_plugin::Result<()> {
        self.inner.upload(path, data).await
    }

    async fn download(&self, path: &str) -> quarry_plugin::Result<Vec<u8>> {
        self.inner.download(path).await
    }

    async fn delete(&self, _path: &str) -> quarry_plugin::Result<()> {
        Err(PluginError::StorageFailure {
            message: "delete is wedged".to_string(),
        })
    }

    async fn list(&self, prefix: &str) -> quarry_plugin::Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn exists(&self, path: &str) -> quarry_plugin::Result<bool> {
        self.inner.exists(path).await
    }
}

// ============ Fixture ============

struct Fixture {
    quarry: Quarry,
    storage: MemoryStorage,
    store: Arc<MemoryArtifactStore>,
    upstream: Arc<FakeUpstream>,
    events: Arc<Mutex<Vec<String>>>,
}

async fn fixture_with(upstream: Arc<FakeUpstream>) -> Fixture {
    let storage = MemoryStorage::new();
    let store = Arc::new(MemoryArtifactStore::new());
    let (recorder, events) = Recorder::new();

    let quarry = QuarryBuilder::new(QuarryConfig::default())
        .register(PluginHandle::Format(Arc::new(
            quarry_plugin::MavenFormat::new(),
        )))
        .unwrap()
        .register(PluginHandle::Format(Arc::new(
            quarry_plugin::RawFormat::new(),
        )))
        .unwrap()
        .register(PluginHandle::Storage(Arc::new(storage.clone())))
        .unwrap()
        .register(PluginHandle::Integration(recorder))
        .unwrap()
        .with_store(store.clone())
        .with_upstream(upstream.clone())
        .build()
        .await
        .unwrap();

    Fixture {
        quarry,
        storage,
        store,
        upstream,
        events,
    }
}

async fn fixture() -> Fixture {
    fixture_with(FakeUpstream::new(&[], Duration::ZERO)).await
}

async fn create_hosted(fixture: &Fixture, name: &str, format: &str) -> String {
    let repo = Repository::hosted(name, format);
    let id = repo.id.clone();
    fixture
        .quarry
        .repositories()
        .create(repo, Some("tester".to_string()))
        .await
        .unwrap();
    id
}

// ============ Round-trip and validation ============

#[tokio::test]
async fn test_upload_download_roundtrip() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "maven").await;

    let payload = b"jar contents".to_vec();
    let checksum = compute_digest(&payload);
    let request = UploadRequest::new(&repo, "com/acme/app/1.0.0/app-1.0.0.jar", payload.clone())
        .with_checksum(checksum.clone())
        .with_uploader("alice");

    let artifact = fixture.quarry.pipeline().upload(request).await.unwrap();
    assert_eq!(artifact.checksum, checksum);
    assert_eq!(artifact.version, "1.0.0");
    assert_eq!(artifact.size, payload.len() as u64);

    let downloaded = fixture
        .quarry
        .pipeline()
        .download(&repo, "com/acme/app/1.0.0/app-1.0.0.jar")
        .await
        .unwrap();
    assert_eq!(downloaded.data, payload);
    assert_eq!(downloaded.checksum, checksum);

    // Download counting is applied to the record
    let record = fixture
        .store
        .find(&repo, "com/acme/app/1.0.0/app-1.0.0.jar")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.download_count, 1);
}

#[tokio::test]
async fn test_checksum_mismatch_stores_nothing() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "maven").await;

    let request = UploadRequest::new(
        &repo,
        "com/acme/app/1.0.0/app-1.0.0.jar",
        b"real payload".to_vec(),
    )
    .with_checksum("sha256:0000000000000000000000000000000000000000000000000000000000000000");

    let result = fixture.quarry.pipeline().upload(request).await;
    assert!(matches!(
        result,
        Err(PipelineError::ChecksumMismatch { .. })
    ));

    // No object, no record
    assert!(!fixture
        .storage
        .exists("com/acme/app/1.0.0/app-1.0.0.jar")
        .await
        .unwrap());
    assert_eq!(fixture.store.record_count(), 0);
}

#[tokio::test]
async fn test_invalid_path_rejected() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "maven").await;

    let result = fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&repo, "shallow.jar", b"x".to_vec()))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Plugin(PluginError::PathInvalid { .. }))
    ));
}

// ============ Delete semantics ============

#[tokio::test]
async fn test_delete_then_download_and_redelete_fail() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "raw").await;

    fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&repo, "docs/readme.txt", b"text".to_vec()))
        .await
        .unwrap();

    fixture
        .quarry
        .pipeline()
        .delete(&repo, "docs/readme.txt", None)
        .await
        .unwrap();

    let result = fixture.quarry.pipeline().download(&repo, "docs/readme.txt").await;
    assert!(matches!(
        result,
        Err(PipelineError::Resolve(ResolveError::ArtifactNotFound { .. }))
    ));

    // Deleting again is an error, not a silent success
    let result = fixture
        .quarry
        .pipeline()
        .delete(&repo, "docs/readme.txt", None)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::ArtifactNotFound { .. })
    ));
}

// ============ Proxy behavior ============

#[tokio::test]
async fn test_single_flight_proxy_downloads() {
    let fixture = fixture_with(FakeUpstream::new(
        &[("lib/app.jar", b"jarbytes")],
        Duration::from_millis(50),
    ))
    .await;

    let repo = Repository::proxy("central", "raw", "https://upstream.example.com").unwrap();
    let repo_id = repo.id.clone();
    fixture
        .quarry
        .repositories()
        .create(repo, None)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pipeline = fixture.quarry.pipeline().clone();
        let repo_id = repo_id.clone();
        tasks.push(tokio::spawn(async move {
            pipeline.download(&repo_id, "lib/app.jar").await
        }));
    }

    for task in tasks {
        let downloaded = task.await.unwrap().unwrap();
        assert_eq!(downloaded.data, b"jarbytes");
    }
    assert_eq!(fixture.upstream.fetch_count(), 1);
}

#[tokio::test]
async fn test_upload_to_proxy_rejected() {
    let fixture = fixture().await;
    let repo = Repository::proxy("central", "raw", "https://upstream.example.com").unwrap();
    let repo_id = repo.id.clone();
    fixture
        .quarry
        .repositories()
        .create(repo, None)
        .await
        .unwrap();

    let result = fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&repo_id, "a.txt", b"x".to_vec()))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Resolve(
            ResolveError::OperationNotSupported { .. }
        ))
    ));
}

// ============ Group behavior ============

#[tokio::test]
async fn test_group_precedence_returns_member_content() {
    let fixture = fixture().await;
    let r1 = create_hosted(&fixture, "r1", "raw").await;

    // r2 with isolated storage
    let r2_storage = MemoryStorage::named("memory-r2");
    fixture
        .quarry
        .plugins()
        .register(PluginHandle::Storage(Arc::new(r2_storage.clone())))
        .unwrap();
    let mut r2_repo = Repository::hosted("r2", "raw");
    r2_repo
        .config
        .insert("storage".to_string(), "memory-r2".to_string());
    let r2 = r2_repo.id.clone();
    fixture
        .quarry
        .repositories()
        .create(r2_repo, None)
        .await
        .unwrap();

    fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&r2, "only.txt", b"from r2".to_vec()))
        .await
        .unwrap();

    let group = Repository::group("g1", "raw", vec![r1, r2.clone()]);
    let group_id = group.id.clone();
    fixture
        .quarry
        .repositories()
        .create(group, None)
        .await
        .unwrap();

    let downloaded = fixture
        .quarry
        .pipeline()
        .download(&group_id, "only.txt")
        .await
        .unwrap();
    assert_eq!(downloaded.data, b"from r2");
    assert_eq!(downloaded.origin, r2);
}

#[tokio::test]
async fn test_group_cycle_rejected_at_registration() {
    let fixture = fixture().await;
    let r1 = create_hosted(&fixture, "r1", "raw").await;

    let inner = Repository::group("inner", "raw", vec![r1]);
    let inner_id = inner.id.clone();
    fixture
        .quarry
        .repositories()
        .create(inner, None)
        .await
        .unwrap();

    let outer = Repository::group("outer", "raw", vec![inner_id.clone()]);
    let outer_id = outer.id.clone();
    fixture
        .quarry
        .repositories()
        .create(outer, None)
        .await
        .unwrap();

    let mut updated = fixture.quarry.repositories().get(&inner_id).unwrap();
    updated.members.push(outer_id);
    let result = fixture.quarry.repositories().update(updated, None).await;
    assert!(matches!(
        result,
        Err(PipelineError::Resolve(ResolveError::GroupCycleDetected { .. }))
    ));
}

#[tokio::test]
async fn test_group_write_rejected() {
    let fixture = fixture().await;
    let r1 = create_hosted(&fixture, "r1", "raw").await;
    let group = Repository::group("g1", "raw", vec![r1]);
    let group_id = group.id.clone();
    fixture
        .quarry
        .repositories()
        .create(group, None)
        .await
        .unwrap();

    let result = fixture
        .quarry
        .pipeline()
        .delete(&group_id, "whatever", None)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Resolve(
            ResolveError::OperationNotSupported { .. }
        ))
    ));
}

// ============ Write serialization ============

#[tokio::test]
async fn test_concurrent_uploads_to_same_path_never_interleave() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "raw").await;

    let payload_a = vec![b'a'; 64 * 1024];
    let payload_b = vec![b'b'; 64 * 1024];

    let mut tasks = Vec::new();
    for payload in [payload_a.clone(), payload_b.clone()] {
        let pipeline = fixture.quarry.pipeline().clone();
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            pipeline
                .upload(UploadRequest::new(&repo, "contended.bin", payload))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // The final object is one of the two payloads in full, and the record
    // agrees with the stored bytes
    let stored = fixture.storage.peek("contended.bin").unwrap();
    assert!(stored == payload_a || stored == payload_b);

    let record = fixture
        .store
        .find(&repo, "contended.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.checksum, compute_digest(&stored));
}

// ============ Compensation ============

#[tokio::test]
async fn test_record_failure_compensates_stored_object() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "raw").await;

    fixture.store.fail_next_save();
    let result = fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&repo, "doomed.txt", b"x".to_vec()))
        .await;
    assert!(matches!(result, Err(PipelineError::RecordStore { .. })));

    // The compensating delete removed the stored object
    assert!(!fixture.storage.exists("doomed.txt").await.unwrap());
}

#[tokio::test]
async fn test_double_fault_surfaces_orphan() {
    let storage = MemoryStorage::new();
    let store = Arc::new(MemoryArtifactStore::new());
    let quarry = QuarryBuilder::new(QuarryConfig::default())
        .register(PluginHandle::Format(Arc::new(
            quarry_plugin::RawFormat::new(),
        )))
        .unwrap()
        .register(PluginHandle::Storage(Arc::new(StuckStorage {
            inner: storage.clone(),
        })))
        .unwrap()
        .with_store(store.clone())
        .build()
        .await
        .unwrap();

    let mut repo = Repository::hosted("releases", "raw");
    repo.config
        .insert("storage".to_string(), "stuck".to_string());
    let repo_id = repo.id.clone();
    quarry.repositories().create(repo, None).await.unwrap();

    store.fail_next_save();
    let result = quarry
        .pipeline()
        .upload(UploadRequest::new(&repo_id, "orphan.txt", b"x".to_vec()))
        .await;

    match result {
        Err(PipelineError::StorageFailure { path, message, .. }) => {
            assert_eq!(path, "orphan.txt");
            assert!(message.contains("orphaned"));
        }
        other => panic!("expected StorageFailure, got {other:?}"),
    }
    // The object really is orphaned in storage
    assert!(storage.exists("orphan.txt").await.unwrap());
}

// ============ Metadata generation ============

#[tokio::test]
async fn test_metadata_index_follows_artifact_set() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "maven").await;

    for version in ["1.0.0", "1.2.0"] {
        let path = format!("com/acme/app/{version}/app-{version}.jar");
        fixture
            .quarry
            .pipeline()
            .upload(UploadRequest::new(&repo, path, b"jar".to_vec()))
            .await
            .unwrap();
    }

    let document = fixture
        .storage
        .peek("com/acme/app/maven-metadata.json")
        .expect("index generated");
    let index: serde_json::Value = serde_json::from_slice(&document).unwrap();
    assert_eq!(index["latest"], "1.2.0");
    assert_eq!(index["versions"], serde_json::json!(["1.0.0", "1.2.0"]));

    // Removing every version removes the index document
    for version in ["1.0.0", "1.2.0"] {
        let path = format!("com/acme/app/{version}/app-{version}.jar");
        fixture
            .quarry
            .pipeline()
            .delete(&repo, &path, None)
            .await
            .unwrap();
    }
    assert!(fixture.storage.peek("com/acme/app/maven-metadata.json").is_none());
}

// ============ Events ============

#[tokio::test]
async fn test_lifecycle_events_delivered_in_order() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "raw").await;

    fixture
        .quarry
        .pipeline()
        .upload(UploadRequest::new(&repo, "docs/a.txt", b"x".to_vec()))
        .await
        .unwrap();
    fixture
        .quarry
        .pipeline()
        .delete(&repo, "docs/a.txt", None)
        .await
        .unwrap();

    fixture.quarry.shutdown().await;

    let seen = fixture.events.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            "repo-created:releases",
            "uploaded:docs/a.txt",
            "deleted:docs/a.txt"
        ]
    );
}

// ============ Repository lifecycle ============

#[tokio::test]
async fn test_unknown_format_rejected_on_create() {
    let fixture = fixture().await;
    let result = fixture
        .quarry
        .repositories()
        .create(Repository::hosted("odd", "cobol"), None)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Plugin(PluginError::UnsupportedFormat { .. }))
    ));
}

#[tokio::test]
async fn test_repository_delete_purges_artifacts() {
    let fixture = fixture().await;
    let repo = create_hosted(&fixture, "releases", "raw").await;

    for path in ["docs/a.txt", "docs/b.txt"] {
        fixture
            .quarry
            .pipeline()
            .upload(UploadRequest::new(&repo, path, b"x".to_vec()))
            .await
            .unwrap();
    }

    fixture
        .quarry
        .repositories()
        .delete(&repo, None)
        .await
        .unwrap();

    assert_eq!(fixture.store.record_count(), 0);
    assert!(!fixture.storage.exists("docs/a.txt").await.unwrap());

    let result = fixture.quarry.pipeline().download(&repo, "docs/a.txt").await;
    assert!(matches!(
        result,
        Err(PipelineError::Resolve(ResolveError::RepositoryNotFound { .. }))
    ));
}
