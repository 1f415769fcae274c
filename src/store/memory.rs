//! In-process record store backing the test suite.
//!
//! Mirrors the PostgreSQL semantics the service relies on: `create` rejects
//! duplicate ids and duplicate `(owner_id, destination)` pairs with
//! `Conflict`, and `record_scan` appends the event and bumps the counter
//! under the store's own lock so the pair commits as one unit even against
//! concurrent trackers.

use super::RecordStore;
use crate::error::AppError;
use crate::models::record::Record;
use crate::models::scan_event::ScanEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, Record>>,
    events: Mutex<Vec<ScanEvent>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the appended scan events, for assertions.
    pub fn scan_events(&self) -> Vec<ScanEvent> {
        self.events.lock().expect("store lock poisoned").clone()
    }

    /// Number of stored records, for assertions.
    pub fn record_count(&self) -> usize {
        self.records.lock().expect("store lock poisoned").len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, AppError> {
        Ok(self
            .records
            .lock()
            .expect("store lock poisoned")
            .get(id)
            .cloned())
    }

    async fn create(&self, record: &Record) -> Result<(), AppError> {
        let mut records = self.records.lock().expect("store lock poisoned");

        if records.contains_key(&record.id) {
            return Err(AppError::Conflict);
        }
        if let Some(owner) = &record.owner_id {
            let duplicate = records.values().any(|existing| {
                existing.owner_id.as_deref() == Some(owner)
                    && existing.destination == record.destination
            });
            if duplicate {
                return Err(AppError::Conflict);
            }
        }

        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_owner_and_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> Result<Option<Record>, AppError> {
        Ok(self
            .records
            .lock()
            .expect("store lock poisoned")
            .values()
            .find(|record| {
                record.owner_id.as_deref() == Some(owner_id) && record.destination == destination
            })
            .cloned())
    }

    async fn record_scan(&self, event: &ScanEvent) -> Result<bool, AppError> {
        // No await point between the increment and the append, so the two
        // commit together even if the calling future is dropped.
        let mut records = self.records.lock().expect("store lock poisoned");
        match records.get_mut(&event.record_id) {
            Some(record) => {
                record.scan_count += 1;
                record.last_scan_at = Some(event.scan_at);
                self.events
                    .lock()
                    .expect("store lock poisoned")
                    .push(event.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, AppError> {
        let records = self.records.lock().expect("store lock poisoned");
        let mut owned: Vec<Record> = records
            .values()
            .filter(|record| record.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.id.cmp(&a.id));

        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(self
            .records
            .lock()
            .expect("store lock poisoned")
            .remove(id)
            .is_some())
    }
}
