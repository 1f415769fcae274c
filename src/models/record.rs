//! Record data models and API request/response types.
//!
//! This module defines:
//! - `Record`: Database entity representing one id -> destination mapping
//! - `CreateRecordRequest` / `CreateRecordResponse` for the creation endpoint
//! - `ManageOperation`: tagged command for the management endpoint
//! - `ImageReference`: time-boxed access reference to a stored QR image

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a record from the database.
///
/// # Database Table
///
/// Maps to the `records` table. Each record:
/// - Has an opaque, URL-safe, lexicographically sortable ULID id
/// - Stores a normalized absolute destination URL, immutable after creation
/// - Tracks how many times its tracking address was scanned
///
/// `scan_count` is mutated only by the store's atomic increment; no caller
/// ever computes it by read-modify-write.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Record {
    /// Unique identifier, generated once and never reused
    pub id: String,

    /// Normalized absolute destination URL
    pub destination: String,

    /// Object-storage key of the rendered QR image
    ///
    /// Empty string means the image step has not completed; such a record
    /// is "pending" and is never surfaced as resolvable.
    pub image_key: String,

    /// Optional caption supplied at creation
    pub label: Option<String>,

    /// Opaque identity of the creator, None for anonymous records
    pub owner_id: Option<String>,

    /// When the record was created, set once
    pub created_at: DateTime<Utc>,

    /// When the tracking address was last resolved, None until first scan
    pub last_scan_at: Option<DateTime<Utc>>,

    /// Number of scans, non-negative and monotonically non-decreasing
    pub scan_count: i64,
}

/// Request to create a record.
///
/// # JSON Example
///
/// ```json
/// {
///   "destination": "example.com/some/page",
///   "label": "September campaign"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    /// Destination address; a missing scheme is normalized to https
    pub destination: String,

    /// Optional caption
    pub label: Option<String>,
}

/// Response returned when a record is created (or deduplicated).
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "01jf3x9z8kq2v7m4n6p8r0s2t4",
///   "destination": "https://example.com/some/page",
///   "image_key": "qr/01jf3x9z8kq2v7m4n6p8r0s2t4.svg",
///   "tracking_address": "https://scan.example/r/01jf3x9z8kq2v7m4n6p8r0s2t4"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct CreateRecordResponse {
    pub id: String,
    pub destination: String,
    pub image_key: String,
    pub tracking_address: String,
}

/// Command accepted by the management endpoint.
///
/// A single entry point dispatches on the `operation` tag through an
/// exhaustive match, so the set of operations is closed and checked by the
/// compiler.
///
/// # JSON Examples
///
/// ```json
/// { "operation": "list", "page": 1, "limit": 20 }
/// { "operation": "delete", "id": "01jf3x9z8kq2v7m4n6p8r0s2t4" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ManageOperation {
    /// Page through the owner's records, newest first
    List {
        page: Option<u32>,
        limit: Option<u32>,
    },
    /// Irreversibly delete one owned record; scan events are orphaned,
    /// not cascaded
    Delete { id: String },
}

/// Result of a management command.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ManageResult {
    Listed {
        page: u32,
        limit: u32,
        records: Vec<Record>,
    },
    Deleted {
        deleted_id: String,
    },
}

/// Time-boxed access reference to a stored QR image.
///
/// The `url` embeds an expiry timestamp and an HMAC signature; the serving
/// route refuses the key once `expires_at` has passed.
#[derive(Debug, Serialize)]
pub struct ImageReference {
    pub id: String,
    pub image_key: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
