//! Service-level tests for the record lifecycle invariants.
//!
//! These run against the in-memory store and a real filesystem image
//! service, exercising dedup idempotence, atomic scan accounting under
//! concurrency, and creation-race recovery.

use async_trait::async_trait;
use chrono::Utc;
use scanlink::cache::TtlCache;
use scanlink::config::Environment;
use scanlink::error::AppError;
use scanlink::models::record::{ManageOperation, ManageResult, Record};
use scanlink::models::scan_event::{ScanEvent, ScanMetadata};
use scanlink::services::image_service::{FsImageService, ImageUrlSigner};
use scanlink::services::record_service::{RecordService, RecordServiceSettings};
use scanlink::store::{MemoryRecordStore, RecordStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn settings() -> RecordServiceSettings {
    RecordServiceSettings {
        public_base_url: "http://localhost:3000".to_string(),
        environment: Environment::Development,
        record_cache_ttl: Duration::from_secs(30),
        image_cache_ttl: Duration::from_secs(3600),
    }
}

fn build_service(store: Arc<dyn RecordStore>) -> (Arc<RecordService>, TempDir) {
    let dir = TempDir::new().expect("temp image dir");
    let service = RecordService::new(
        store,
        Arc::new(FsImageService::new(dir.path())),
        ImageUrlSigner::new("test-secret", Duration::from_secs(300)),
        Arc::new(TtlCache::new("records")),
        Arc::new(TtlCache::new("image_keys")),
        settings(),
    );
    (Arc::new(service), dir)
}

#[tokio::test]
async fn generate_normalizes_and_persists() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, dir) = build_service(store.clone());

    let record = service
        .generate("example.com/page", Some("launch".to_string()), Some("42"))
        .await
        .unwrap();

    assert_eq!(record.destination, "https://example.com/page");
    assert_eq!(record.scan_count, 0);
    assert!(record.last_scan_at.is_none());
    assert_eq!(record.image_key, format!("qr/{}.svg", record.id));

    // The image exists on disk before the record was persisted.
    assert!(dir.path().join(&record.image_key).exists());
    assert_eq!(store.record_count(), 1);
}

#[tokio::test]
async fn generate_is_idempotent_per_owner_destination() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let first = service
        .generate("https://example.com/a", None, Some("42"))
        .await
        .unwrap();
    let second = service
        .generate("https://example.com/a", None, Some("42"))
        .await
        .unwrap();
    let other = service
        .generate("https://example.com/b", None, Some("42"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.id, other.id);
    assert_eq!(store.record_count(), 2);
}

#[tokio::test]
async fn anonymous_records_are_never_deduplicated() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let first = service
        .generate("https://example.com/a", None, None)
        .await
        .unwrap();
    let second = service
        .generate("https://example.com/a", None, None)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(store.record_count(), 2);
}

#[tokio::test]
async fn rejected_destination_persists_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, dir) = build_service(store.clone());

    let err = service
        .generate("javascript:alert(1)", None, Some("42"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidDestination(_)));
    assert_eq!(store.record_count(), 0);
    // No orphan image either.
    assert!(
        std::fs::read_dir(dir.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    );
}

#[tokio::test]
async fn track_accounts_exactly_once() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let record = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    let metadata = ScanMetadata {
        user_agent: "test-agent".to_string(),
        referer: "https://ref.example".to_string(),
        source_address: "203.0.113.9".to_string(),
        region: "DE".to_string(),
    };
    let destination = service.track(&record.id, metadata).await.unwrap();
    assert_eq!(destination, "https://example.com/x");

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.scan_count, 1);
    assert!(stored.last_scan_at.is_some());

    let events = store.scan_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].record_id, record.id);
    assert_eq!(events[0].user_agent, "test-agent");
    assert_eq!(events[0].region, "DE");
}

#[tokio::test]
async fn concurrent_tracks_lose_no_increment() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let record = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    const SCANS: usize = 25;
    let mut handles = Vec::with_capacity(SCANS);
    for _ in 0..SCANS {
        let service = Arc::clone(&service);
        let id = record.id.clone();
        handles.push(tokio::spawn(async move {
            service.track(&id, ScanMetadata::default()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.scan_count, SCANS as i64);
    assert_eq!(store.scan_events().len(), SCANS);
}

/// Store wrapper whose scan accounting stalls long enough for a caller's
/// timeout to fire first.
struct SlowScanStore {
    inner: MemoryRecordStore,
}

#[async_trait]
impl RecordStore for SlowScanStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, AppError> {
        self.inner.get(id).await
    }

    async fn create(&self, record: &Record) -> Result<(), AppError> {
        self.inner.create(record).await
    }

    async fn find_by_owner_and_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> Result<Option<Record>, AppError> {
        self.inner.find_by_owner_and_destination(owner_id, destination).await
    }

    async fn record_scan(&self, event: &ScanEvent) -> Result<bool, AppError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inner.record_scan(event).await
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, AppError> {
        self.inner.list_by_owner(owner_id, limit, offset).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn cancelled_track_leaves_no_partial_scan() {
    let store = Arc::new(SlowScanStore {
        inner: MemoryRecordStore::new(),
    });
    let (service, _dir) = build_service(store.clone());

    let record = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    // The caller gives up before accounting completes, dropping the track
    // future mid-flight.
    let result = tokio::time::timeout(
        Duration::from_millis(50),
        service.track(&record.id, ScanMetadata::default()),
    )
    .await;
    assert!(result.is_err());

    // Accounting is all-or-nothing: no event row may exist without its
    // counter bump.
    let stored = store.inner.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.scan_count, 0);
    assert!(store.inner.scan_events().is_empty());
    assert!(stored.last_scan_at.is_none());
}

#[tokio::test]
async fn track_unknown_id_leaves_no_trace() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let err = service
        .track("01jf3x9z8kq2v7m4n6p8r0s2t4", ScanMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound));
    assert!(store.scan_events().is_empty());
}

#[tokio::test]
async fn manage_list_pages_owner_records() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    for n in 0..3 {
        service
            .generate(&format!("https://example.com/{n}"), None, Some("42"))
            .await
            .unwrap();
    }
    service
        .generate("https://example.com/other", None, Some("99"))
        .await
        .unwrap();

    let result = service
        .manage(
            "42",
            ManageOperation::List {
                page: Some(1),
                limit: Some(2),
            },
        )
        .await
        .unwrap();

    match result {
        ManageResult::Listed {
            page,
            limit,
            records,
        } => {
            assert_eq!(page, 1);
            assert_eq!(limit, 2);
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.owner_id.as_deref() == Some("42")));
        }
        other => panic!("expected list result, got {other:?}"),
    }
}

#[tokio::test]
async fn manage_delete_checks_ownership_and_orphans_events() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, dir) = build_service(store.clone());

    let record = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();
    service
        .track(&record.id, ScanMetadata::default())
        .await
        .unwrap();

    // Someone else cannot delete it, and learns nothing but NotFound.
    let err = service
        .manage(
            "99",
            ManageOperation::Delete {
                id: record.id.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(store.record_count(), 1);

    // The owner can; events survive the deletion.
    let result = service
        .manage(
            "42",
            ManageOperation::Delete {
                id: record.id.clone(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(result, ManageResult::Deleted { .. }));
    assert_eq!(store.record_count(), 0);
    assert_eq!(store.scan_events().len(), 1);
    assert!(!dir.path().join(&record.image_key).exists());
}

/// Store wrapper that hides the existing record from the first dedup
/// lookup, forcing `generate` down the create-conflict path.
struct RacingStore {
    inner: MemoryRecordStore,
    skip_first_lookup: AtomicBool,
}

#[async_trait]
impl RecordStore for RacingStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, AppError> {
        self.inner.get(id).await
    }

    async fn create(&self, record: &Record) -> Result<(), AppError> {
        self.inner.create(record).await
    }

    async fn find_by_owner_and_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> Result<Option<Record>, AppError> {
        if self.skip_first_lookup.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner
            .find_by_owner_and_destination(owner_id, destination)
            .await
    }

    async fn record_scan(&self, event: &ScanEvent) -> Result<bool, AppError> {
        self.inner.record_scan(event).await
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, AppError> {
        self.inner.list_by_owner(owner_id, limit, offset).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn creation_race_loser_returns_winner() {
    let store = Arc::new(RacingStore {
        inner: MemoryRecordStore::new(),
        skip_first_lookup: AtomicBool::new(false),
    });
    let (service, dir) = build_service(store.clone());

    let winner = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    // The next generate misses the dedup lookup (simulating a concurrent
    // creation that committed in between), hits the uniqueness constraint,
    // and recovers by returning the winner.
    store.skip_first_lookup.store(true, Ordering::SeqCst);
    let recovered = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    assert_eq!(recovered.id, winner.id);
    assert_eq!(store.inner.record_count(), 1);
    // The loser's orphaned image was cleaned up; only the winner's remains.
    let images: Vec<_> = std::fs::read_dir(dir.path().join("qr"))
        .unwrap()
        .collect();
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn image_reference_round_trip() {
    let store = Arc::new(MemoryRecordStore::new());
    let (service, _dir) = build_service(store.clone());

    let record = service
        .generate("https://example.com/x", None, Some("42"))
        .await
        .unwrap();

    let reference = service.image_reference(&record.id).await.unwrap();
    assert_eq!(reference.image_key, record.image_key);
    assert!(reference.expires_at > Utc::now());

    // The reference's own parameters verify; tampering does not.
    let exp = reference.expires_at.timestamp();
    let sig = reference.url.rsplit("sig=").next().unwrap().to_string();
    assert!(service.verify_image_access(&reference.image_key, exp, &sig));
    assert!(!service.verify_image_access(&reference.image_key, exp + 1, &sig));

    let bytes = service.load_image(&reference.image_key).await.unwrap();
    assert!(String::from_utf8(bytes).unwrap().contains("<svg"));

    assert!(matches!(
        service.image_reference("nonexistent").await,
        Err(AppError::NotFound)
    ));
}
