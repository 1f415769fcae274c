//! Durable storage of records and scan events.
//!
//! `RecordStore` is the only component that requires cross-process
//! coordination, and that coordination is delegated entirely to the two
//! primitives the trait exposes: the uniqueness constraint enforced by
//! `create` and the atomic scan accounting behind `record_scan`.
//! Everything above this seam stays free of read-modify-write counters.

mod memory;
mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

use crate::error::AppError;
use crate::models::record::Record;
use crate::models::scan_event::ScanEvent;
use async_trait::async_trait;

/// Keyed persistence for records and their scan events.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<Record>, AppError>;

    /// Persist a new record.
    ///
    /// Fails with [`AppError::Conflict`] on a duplicate id or a duplicate
    /// `(owner_id, destination)` dedup key, which is how concurrent
    /// creations for the same pair are reduced to a single winner.
    async fn create(&self, record: &Record) -> Result<(), AppError>;

    /// Secondary lookup on the dedup key.
    async fn find_by_owner_and_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> Result<Option<Record>, AppError>;

    /// Account for one scan: append the event and add exactly one to the
    /// record's scan count, stamping `last_scan_at` with the event time.
    ///
    /// The append and the increment are one atomic unit inside the store,
    /// so a caller dropped mid-call can never leave an event without its
    /// counter bump, and concurrent trackers never lose an increment.
    ///
    /// Returns `false` when the record no longer exists; nothing is
    /// persisted in that case.
    async fn record_scan(&self, event: &ScanEvent) -> Result<bool, AppError>;

    /// Page through one owner's records, newest first.
    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, AppError>;

    /// Delete a record, returning whether it existed. Ownership is checked
    /// by the caller before invocation; scan events are left in place.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;
}
