//! QR image rendering, storage, and signed access references.
//!
//! The renderer is treated as an opaque function from tracking address to
//! image bytes; everything interesting here is the storage key discipline
//! and the time-boxed HMAC references that keep stored images from being
//! enumerable.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use qrcode::QrCode;
use qrcode::render::svg;
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};

type HmacSha256 = Hmac<Sha256>;

/// Renders scannable images and persists them under stable keys.
///
/// The key naming convention (`qr/<id>.svg`) is supplied by the caller;
/// this service only enforces that keys stay inside its root.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Render a scannable image encoding `content`.
    fn render(&self, content: &str) -> Result<Vec<u8>, AppError>;

    /// Persist `bytes` under `key`, returning the key.
    async fn store(&self, bytes: &[u8], key: &str) -> Result<String, AppError>;

    /// Read back the bytes stored under `key`.
    async fn load(&self, key: &str) -> Result<Vec<u8>, AppError>;

    /// Remove the object stored under `key`. Missing objects are fine.
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Filesystem-backed image service rendering QR codes as SVG.
pub struct FsImageService {
    root: PathBuf,
}

impl FsImageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` under the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        if key.is_empty() || !valid_key(key) {
            return Err(AppError::NotFound);
        }
        Ok(self.root.join(key))
    }
}

/// Keys are relative paths of plain `[a-z0-9._-]` segments; `..`, absolute
/// paths, and exotic characters are rejected outright.
fn valid_key(key: &str) -> bool {
    let path = Path::new(key);
    path.components().all(|component| match component {
        Component::Normal(segment) => segment
            .to_str()
            .is_some_and(|s| {
                !s.is_empty()
                    && s != ".."
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            }),
        _ => false,
    })
}

#[async_trait]
impl ImageService for FsImageService {
    fn render(&self, content: &str) -> Result<Vec<u8>, AppError> {
        let code = QrCode::new(content.as_bytes())
            .map_err(|e| AppError::Upstream(format!("QR render failed: {e}")))?;

        let image = code
            .render::<svg::Color>()
            .min_dimensions(256, 256)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();

        Ok(image.into_bytes())
    }

    async fn store(&self, bytes: &[u8], key: &str) -> Result<String, AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Upstream(format!("image store failed: {e}")))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Upstream(format!("image store failed: {e}")))?;

        Ok(key.to_string())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound),
            Err(e) => Err(AppError::Upstream(format!("image load failed: {e}"))),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Upstream(format!("image remove failed: {e}"))),
        }
    }
}

/// Signs and verifies time-boxed image access URLs.
///
/// The signature covers `<key>:<exp>`, so neither the key nor the expiry
/// can be altered without invalidating the reference.
pub struct ImageUrlSigner {
    secret: Vec<u8>,
    access_ttl: chrono::Duration,
}

impl ImageUrlSigner {
    pub fn new(secret: &str, access_ttl: std::time::Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            access_ttl: chrono::Duration::from_std(access_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    fn mac(&self, key: &str, exp: i64) -> Result<HmacSha256, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Upstream(format!("signer key error: {e}")))?;
        mac.update(format!("{key}:{exp}").as_bytes());
        Ok(mac)
    }

    /// Produce a relative signed URL and its expiry for `key`.
    pub fn sign(&self, key: &str) -> Result<(String, DateTime<Utc>), AppError> {
        let expires_at = Utc::now() + self.access_ttl;
        let exp = expires_at.timestamp();
        let sig = hex::encode(self.mac(key, exp)?.finalize().into_bytes());
        Ok((format!("/i/{key}?exp={exp}&sig={sig}"), expires_at))
    }

    /// Verify a signature for `key` at expiry `exp`, rejecting expired or
    /// forged references. The comparison is constant-time.
    pub fn verify(&self, key: &str, exp: i64, sig: &str) -> bool {
        let Some(expires_at) = Utc.timestamp_opt(exp, 0).single() else {
            return false;
        };
        if Utc::now() > expires_at {
            return false;
        }
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mac) = self.mac(key, exp) else {
            return false;
        };
        mac.verify_slice(&expected).is_ok()
    }
}
