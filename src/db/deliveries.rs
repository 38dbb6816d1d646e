//! Delivery ledger: what reached each destination, and in which formats.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, DeliveryRow, DeliveryStatus, NewDelivery};

impl Database {
    /// Record the outcome of delivering a record to a destination
    ///
    /// Re-delivering the same pair replaces the previous outcome and bumps `attempts`.
    pub async fn record_delivery(&self, delivery: &NewDelivery) -> Result<()> {
        let primary = delivery
            .primary_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let secondary = delivery
            .secondary_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            r#"
            INSERT INTO deliveries (
                record_key, destination, display_name, status,
                primary_path, secondary_path, error_code, error_message,
                attempts, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(record_key, destination) DO UPDATE SET
                display_name = excluded.display_name,
                status = excluded.status,
                primary_path = excluded.primary_path,
                secondary_path = excluded.secondary_path,
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                attempts = deliveries.attempts + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&delivery.record_key)
        .bind(&delivery.destination)
        .bind(&delivery.display_name)
        .bind(delivery.status.as_str())
        .bind(primary)
        .bind(secondary)
        .bind(&delivery.error_code)
        .bind(&delivery.error_message)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record delivery: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the ledger entry for a (record, destination) pair
    pub async fn get_delivery(
        &self,
        record_key: &str,
        destination: &str,
    ) -> Result<Option<DeliveryRow>> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT record_key, destination, display_name, status, primary_path,
                   secondary_path, error_code, error_message, attempts, updated_at
            FROM deliveries
            WHERE record_key = ? AND destination = ?
            "#,
        )
        .bind(record_key)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get delivery: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List ledger entries with a given status, most recent first
    pub async fn list_deliveries_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<DeliveryRow>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT record_key, destination, display_name, status, primary_path,
                   secondary_path, error_code, error_message, attempts, updated_at
            FROM deliveries
            WHERE status = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list deliveries: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
