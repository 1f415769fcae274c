//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Deployment environment, controls the destination policy.
///
/// In `Production`, loopback and private-range destination hosts are
/// rejected so the tracking redirect cannot be used to probe internal
/// networks. `Development` allows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PUBLIC_BASE_URL` (optional): base address used to build the tracking
///   addresses embedded in QR images
/// - `ENVIRONMENT` (optional): `development` or `production`
/// - `IMAGE_DIR` (optional): directory for rendered QR images
/// - `IMAGE_URL_SECRET` (optional): HMAC secret for time-boxed image links
/// - limiter / cache / timeout tunables, see field defaults
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_environment")]
    pub environment: Environment,

    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    #[serde(default = "default_image_url_secret")]
    pub image_url_secret: String,

    /// Seconds a signed image reference stays valid.
    #[serde(default = "default_image_access_ttl_secs")]
    pub image_access_ttl_secs: u64,

    /// Record creations allowed per identity per window.
    #[serde(default = "default_create_rate_limit")]
    pub create_rate_limit: u32,

    #[serde(default = "default_create_rate_window_secs")]
    pub create_rate_window_secs: u64,

    /// Scans allowed per identity per window.
    #[serde(default = "default_track_rate_limit")]
    pub track_rate_limit: u32,

    #[serde(default = "default_track_rate_window_secs")]
    pub track_rate_window_secs: u64,

    /// TTL for cached records. Short because scan counters go stale.
    #[serde(default = "default_record_cache_ttl_secs")]
    pub record_cache_ttl_secs: u64,

    /// TTL for cached image keys. Long because keys are stable.
    #[serde(default = "default_image_cache_ttl_secs")]
    pub image_cache_ttl_secs: u64,

    /// Upper bound on a single generate/track call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// When false (the default), a creation attempt that fails with an
    /// upstream error refunds its rate-limit charge.
    #[serde(default)]
    pub count_failed_requests: bool,
}

fn default_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_image_url_secret() -> String {
    // Fine for development; deployments override it.
    "scanlink-dev-secret".to_string()
}

fn default_image_access_ttl_secs() -> u64 {
    300
}

fn default_create_rate_limit() -> u32 {
    10
}

fn default_create_rate_window_secs() -> u64 {
    60
}

fn default_track_rate_limit() -> u32 {
    120
}

fn default_track_rate_window_secs() -> u64 {
    60
}

fn default_record_cache_ttl_secs() -> u64 {
    30
}

fn default_image_cache_ttl_secs() -> u64 {
    3600
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
