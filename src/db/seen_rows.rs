//! Form rows already handed to the pipeline.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check whether a row fingerprint was already processed for a source
    pub async fn is_row_seen(&self, source: &str, fingerprint: &str) -> Result<bool> {
        let seen: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM seen_rows WHERE source = ? AND fingerprint = ?",
        )
        .bind(source)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check seen row: {}",
                e
            )))
        })?;

        Ok(seen.is_some())
    }

    /// Mark row fingerprints as processed
    ///
    /// All fingerprints are recorded in one transaction, so a failure leaves the whole
    /// batch to be fetched again on the next run.
    pub async fn mark_rows_seen(&self, source: &str, fingerprints: &[String]) -> Result<()> {
        if fingerprints.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let now = chrono::Utc::now().timestamp();
        for fingerprint in fingerprints {
            sqlx::query(
                r#"
                INSERT INTO seen_rows (source, fingerprint, seen_at)
                VALUES (?, ?, ?)
                ON CONFLICT(source, fingerprint) DO NOTHING
                "#,
            )
            .bind(source)
            .bind(fingerprint)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark row as seen: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit seen rows: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Number of rows recorded as processed for a source
    pub async fn seen_row_count(&self, source: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen_rows WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count seen rows: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
