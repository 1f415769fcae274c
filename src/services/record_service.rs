//! Record service - generation, tracking, and management orchestration.
//!
//! This service owns the record lifecycle:
//! - `generate`: validate -> deduplicate -> allocate id -> render/store
//!   image -> persist record -> populate caches
//! - `track`: fetch -> atomic scan accounting (event plus counter as one
//!   unit) -> return destination
//! - `manage`: owner-scoped list/delete commands
//!
//! # Atomicity guarantees
//!
//! A record becomes visible only after its image exists, so no pending
//! record ever reaches the dedup lookup or the tracking path. The scan
//! counter is bumped exclusively by the store's atomic increment; a losing
//! side of a creation race discards its own half-created state and returns
//! the winner.

use crate::cache::{TtlCache, owner_tag, record_tag};
use crate::config::{Config, Environment};
use crate::error::AppError;
use crate::models::record::{ImageReference, ManageOperation, ManageResult, Record};
use crate::models::scan_event::{ScanEvent, ScanMetadata};
use crate::services::image_service::{ImageService, ImageUrlSigner};
use crate::store::RecordStore;
use crate::validation::normalize_destination;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Prefix of every stored image key: `qr/<id>.svg`.
const IMAGE_KEY_PREFIX: &str = "qr";

/// Page size bounds for the list operation.
const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Tunables the service needs from configuration.
#[derive(Debug, Clone)]
pub struct RecordServiceSettings {
    pub public_base_url: String,
    pub environment: Environment,
    pub record_cache_ttl: Duration,
    pub image_cache_ttl: Duration,
}

impl RecordServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_base_url: config.public_base_url.clone(),
            environment: config.environment,
            record_cache_ttl: Duration::from_secs(config.record_cache_ttl_secs),
            image_cache_ttl: Duration::from_secs(config.image_cache_ttl_secs),
        }
    }
}

/// Long-lived service object constructed once at process start and shared
/// by reference with every request handler.
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    images: Arc<dyn ImageService>,
    signer: ImageUrlSigner,
    record_cache: Arc<TtlCache<Record>>,
    image_cache: Arc<TtlCache<String>>,
    settings: RecordServiceSettings,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        images: Arc<dyn ImageService>,
        signer: ImageUrlSigner,
        record_cache: Arc<TtlCache<Record>>,
        image_cache: Arc<TtlCache<String>>,
        settings: RecordServiceSettings,
    ) -> Self {
        Self {
            store,
            images,
            signer,
            record_cache,
            image_cache,
            settings,
        }
    }

    /// The address embedded in the QR image for `id`; resolving it triggers
    /// [`RecordService::track`].
    pub fn tracking_address(&self, id: &str) -> String {
        format!(
            "{}/r/{id}",
            self.settings.public_base_url.trim_end_matches('/')
        )
    }

    /// Create a record for `destination_input`, or return the owner's
    /// existing record for the same destination.
    ///
    /// Generation is idempotent per `(owner, destination)` pair: the dedup
    /// lookup runs before allocation, and the store's uniqueness constraint
    /// catches the remaining race window, in which case the loser discards
    /// its image and returns the winner.
    pub async fn generate(
        &self,
        destination_input: &str,
        label: Option<String>,
        owner_id: Option<&str>,
    ) -> Result<Record, AppError> {
        let destination = normalize_destination(destination_input, self.settings.environment)?;

        // Idempotent dedup for owned records. Anonymous records carry no
        // dedup key and always create fresh.
        if let Some(owner) = owner_id
            && let Some(existing) = self
                .store
                .find_by_owner_and_destination(owner, &destination)
                .await?
        {
            tracing::debug!(id = %existing.id, "deduplicated record creation");
            return Ok(existing);
        }

        let id = Ulid::new().to_string().to_lowercase();
        let tracking_address = self.tracking_address(&id);
        let image_key = format!("{IMAGE_KEY_PREFIX}/{id}.svg");

        // Render and persist the image before the record exists, so a
        // persisted record is always complete.
        let bytes = self.images.render(&tracking_address)?;
        let image_key = self.images.store(&bytes, &image_key).await?;

        let record = Record {
            id,
            destination,
            image_key,
            label,
            owner_id: owner_id.map(String::from),
            created_at: Utc::now(),
            last_scan_at: None,
            scan_count: 0,
        };

        match self.store.create(&record).await {
            Ok(()) => {}
            Err(AppError::Conflict) => {
                // Lost a creation race on the dedup key. Drop our orphaned
                // image and hand back the winner.
                if let Err(err) = self.images.remove(&record.image_key).await {
                    tracing::warn!(key = %record.image_key, error = %err, "orphan image cleanup failed");
                }
                if let Some(owner) = owner_id
                    && let Some(winner) = self
                        .store
                        .find_by_owner_and_destination(owner, &record.destination)
                        .await?
                {
                    tracing::debug!(id = %winner.id, "creation race resolved to winner");
                    return Ok(winner);
                }
                return Err(AppError::Conflict);
            }
            Err(err) => {
                if let Err(cleanup) = self.images.remove(&record.image_key).await {
                    tracing::warn!(key = %record.image_key, error = %cleanup, "orphan image cleanup failed");
                }
                return Err(err);
            }
        }

        self.cache_record(&record);
        tracing::info!(id = %record.id, owner = ?record.owner_id, "record created");
        Ok(record)
    }

    /// Resolve a scan of `id`: account for it and return the destination.
    ///
    /// Accounting is a single store operation, so N concurrent calls add
    /// exactly N, and a call cancelled mid-flight either committed the
    /// event together with its increment or left nothing. An unknown id
    /// fails `NotFound` without producing a scan event or touching any
    /// counter.
    pub async fn track(&self, id: &str, metadata: ScanMetadata) -> Result<String, AppError> {
        let record = match self.record_cache.get(id) {
            Some(record) => record,
            None => self.store.get(id).await?.ok_or(AppError::NotFound)?,
        };

        let event = ScanEvent::new(&record.id, metadata);
        if !self.store.record_scan(&event).await? {
            // Deleted between fetch and accounting.
            self.record_cache.delete(id);
            return Err(AppError::NotFound);
        }

        // The cached copy's counters are now stale; the long-TTL image-key
        // entry stays valid.
        self.record_cache.delete(id);

        tracing::debug!(id = %record.id, "scan recorded");
        Ok(record.destination)
    }

    /// Dispatch a management command for `owner_id`.
    pub async fn manage(
        &self,
        owner_id: &str,
        operation: ManageOperation,
    ) -> Result<ManageResult, AppError> {
        match operation {
            ManageOperation::List { page, limit } => {
                let page = page.unwrap_or(1).max(1);
                let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
                let offset = i64::from(page - 1) * i64::from(limit);

                let records = self
                    .store
                    .list_by_owner(owner_id, i64::from(limit), offset)
                    .await?;

                Ok(ManageResult::Listed {
                    page,
                    limit,
                    records,
                })
            }
            ManageOperation::Delete { id } => {
                let record = self.store.get(&id).await?.ok_or(AppError::NotFound)?;

                // A non-owner learns nothing beyond "not found".
                if record.owner_id.as_deref() != Some(owner_id) {
                    return Err(AppError::NotFound);
                }

                if !self.store.delete(&id).await? {
                    return Err(AppError::NotFound);
                }

                if let Err(err) = self.images.remove(&record.image_key).await {
                    tracing::warn!(key = %record.image_key, error = %err, "image removal failed");
                }

                // Drop every cache entry derived from this record, plus the
                // owner's tagged entries, in one pass.
                let tags = vec![record_tag(&id), owner_tag(owner_id)];
                self.record_cache.invalidate_by_tags(&tags);
                self.image_cache.invalidate_by_tags(&[record_tag(&id)]);

                tracing::info!(id = %id, owner = %owner_id, "record deleted");
                Ok(ManageResult::Deleted { deleted_id: id })
            }
        }
    }

    /// Produce a time-boxed access reference for the record's stored image.
    pub async fn image_reference(&self, id: &str) -> Result<ImageReference, AppError> {
        let image_key = match self.image_cache.get(id) {
            Some(key) => key,
            None => {
                let record = self.store.get(id).await?.ok_or(AppError::NotFound)?;
                // Pending records are not resolvable from the outside.
                if record.image_key.is_empty() {
                    return Err(AppError::NotFound);
                }
                self.image_cache.set(
                    id,
                    record.image_key.clone(),
                    self.settings.image_cache_ttl,
                    vec![record_tag(id)],
                );
                record.image_key
            }
        };

        let (url, expires_at) = self.signer.sign(&image_key)?;
        Ok(ImageReference {
            id: id.to_string(),
            image_key,
            url,
            expires_at,
        })
    }

    /// Verify a signed image access reference.
    pub fn verify_image_access(&self, key: &str, exp: i64, sig: &str) -> bool {
        self.signer.verify(key, exp, sig)
    }

    /// Read the stored image bytes for a verified key.
    pub async fn load_image(&self, key: &str) -> Result<Vec<u8>, AppError> {
        self.images.load(key).await
    }

    fn cache_record(&self, record: &Record) {
        let mut tags = vec![record_tag(&record.id)];
        if let Some(owner) = &record.owner_id {
            tags.push(owner_tag(owner));
        }
        self.record_cache.set(
            &record.id,
            record.clone(),
            self.settings.record_cache_ttl,
            tags,
        );
        self.image_cache.set(
            &record.id,
            record.image_key.clone(),
            self.settings.image_cache_ttl,
            vec![record_tag(&record.id)],
        );
    }
}
