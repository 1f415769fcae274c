//! Shared application state.
//!
//! The caches, limiters, and record service are long-lived objects built
//! once at process start and handed to request handlers by reference, so
//! their lifetime and ownership stay explicit.

use crate::cache::TtlCache;
use crate::config::Config;
use crate::models::record::Record;
use crate::rate_limit::FixedWindowLimiter;
use crate::services::image_service::{FsImageService, ImageService, ImageUrlSigner};
use crate::services::record_service::{RecordService, RecordServiceSettings};
use crate::store::RecordStore;
use std::sync::Arc;
use std::time::Duration;

/// The named limiter instances, tuned independently per operation class.
pub struct Limiters {
    pub create: Arc<FixedWindowLimiter>,
    pub track: Arc<FixedWindowLimiter>,
}

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RecordService>,
    pub limiters: Arc<Limiters>,
    pub config: Arc<Config>,
    record_cache: Arc<TtlCache<Record>>,
    image_cache: Arc<TtlCache<String>>,
}

impl AppState {
    /// Wire caches, limiters, and the record service around a store.
    /// `main` passes the Postgres store; the test suite passes the
    /// in-memory one.
    pub fn build(config: Config, store: Arc<dyn RecordStore>) -> Self {
        let images = Arc::new(FsImageService::new(config.image_dir.clone()));
        Self::build_with_images(config, store, images)
    }

    pub fn build_with_images(
        config: Config,
        store: Arc<dyn RecordStore>,
        images: Arc<dyn ImageService>,
    ) -> Self {
        let record_cache: Arc<TtlCache<Record>> = Arc::new(TtlCache::new("records"));
        let image_cache: Arc<TtlCache<String>> = Arc::new(TtlCache::new("image_keys"));

        let signer = ImageUrlSigner::new(
            &config.image_url_secret,
            Duration::from_secs(config.image_access_ttl_secs),
        );

        let service = Arc::new(RecordService::new(
            store,
            images,
            signer,
            Arc::clone(&record_cache),
            Arc::clone(&image_cache),
            RecordServiceSettings::from_config(&config),
        ));

        let limiters = Arc::new(Limiters {
            create: Arc::new(FixedWindowLimiter::new(
                "create",
                Duration::from_secs(config.create_rate_window_secs),
                config.create_rate_limit,
            )),
            track: Arc::new(FixedWindowLimiter::new(
                "track",
                Duration::from_secs(config.track_rate_window_secs),
                config.track_rate_limit,
            )),
        });

        Self {
            service,
            limiters,
            config: Arc::new(config),
            record_cache,
            image_cache,
        }
    }

    /// Start the background sweep/reap tasks that bound cache and limiter
    /// memory. Separate from `build` so tests can skip them.
    pub fn spawn_maintenance(&self) {
        let _ = Arc::clone(&self.record_cache).spawn_sweeper(Duration::from_secs(60));
        let _ = Arc::clone(&self.image_cache).spawn_sweeper(Duration::from_secs(300));
        let _ = Arc::clone(&self.limiters.create).spawn_reaper(Duration::from_secs(120));
        let _ = Arc::clone(&self.limiters.track).spawn_reaper(Duration::from_secs(120));
    }
}
