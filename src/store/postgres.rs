//! PostgreSQL-backed record store.
//!
//! The two coordination primitives live here: the partial unique index on
//! `(owner_id, destination)` turns creation races into `Conflict`, and scan
//! accounting runs in one transaction with the counter bumped by
//! `UPDATE ... scan_count + 1`, atomic at the database and never computed
//! client-side.

use super::RecordStore;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::record::Record;
use crate::models::scan_event::ScanEvent;
use async_trait::async_trait;

pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, AppError> {
        let record = sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn create(&self, record: &Record) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO records (
                id,
                destination,
                image_key,
                label,
                owner_id,
                created_at,
                last_scan_at,
                scan_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.destination)
        .bind(&record.image_key)
        .bind(&record.label)
        .bind(&record.owner_id)
        .bind(record.created_at)
        .bind(record.last_scan_at)
        .bind(record.scan_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_owner_and_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> Result<Option<Record>, AppError> {
        let record = sqlx::query_as::<_, Record>(
            "SELECT * FROM records WHERE owner_id = $1 AND destination = $2",
        )
        .bind(owner_id)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_scan(&self, event: &ScanEvent) -> Result<bool, AppError> {
        // One transaction covers both statements: a caller dropped between
        // them rolls back, so an event row never outlives a lost increment.
        // The addition happens inside the UPDATE, so concurrent trackers
        // each contribute exactly one.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE records
            SET scan_count = scan_count + 1,
                last_scan_at = $2
            WHERE id = $1
            "#,
        )
        .bind(&event.record_id)
        .bind(event.scan_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO scan_events (
                id,
                record_id,
                scan_at,
                user_agent,
                referer,
                source_address,
                region
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(&event.record_id)
        .bind(event.scan_at)
        .bind(&event.user_agent)
        .bind(&event.referer)
        .bind(&event.source_address)
        .bind(&event.region)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Record>, AppError> {
        // ULIDs sort lexicographically by creation time, so ordering by id
        // descending yields newest first.
        let records = sqlx::query_as::<_, Record>(
            r#"
            SELECT * FROM records
            WHERE owner_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }
}
