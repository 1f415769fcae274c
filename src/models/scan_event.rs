//! Scan event model: one row per resolution of a tracking address.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Best-effort request metadata captured with a scan.
///
/// Every field is optional on the wire and stored as an empty string when
/// absent; a scan is never rejected for missing metadata.
#[derive(Debug, Clone, Default)]
pub struct ScanMetadata {
    pub user_agent: String,
    pub referer: String,
    pub source_address: String,
    pub region: String,
}

impl ScanMetadata {
    /// Extract metadata from request headers.
    ///
    /// `source_address` takes the first `X-Forwarded-For` hop; `region`
    /// takes `CF-IPCountry` when an edge proxy supplies it.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let source_address = header("x-forwarded-for")
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        Self {
            user_agent: header("user-agent"),
            referer: header("referer"),
            source_address,
            region: header("cf-ipcountry"),
        }
    }
}

/// A persisted scan event.
///
/// `scan_at` is the event's natural ordering key. Events reference their
/// record by id only; deleting the record orphans them on purpose so the
/// audit trail survives.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScanEvent {
    pub id: Uuid,
    pub record_id: String,
    pub scan_at: DateTime<Utc>,
    pub user_agent: String,
    pub referer: String,
    pub source_address: String,
    pub region: String,
}

impl ScanEvent {
    /// Build an event for `record_id` stamped with the current time.
    pub fn new(record_id: &str, metadata: ScanMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id: record_id.to_string(),
            scan_at: Utc::now(),
            user_agent: metadata.user_agent,
            referer: metadata.referer,
            source_address: metadata.source_address,
            region: metadata.region,
        }
    }
}
