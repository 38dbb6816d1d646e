//! Persisted destination credentials.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Get the stored secret for a (scope, destination, account) key
    ///
    /// Returns None if nothing was stored yet.
    pub async fn get_secret(
        &self,
        scope: &str,
        destination: &str,
        account: &str,
    ) -> Result<Option<String>> {
        let secret: Option<String> = sqlx::query_scalar(
            "SELECT secret FROM secrets WHERE scope = ? AND destination = ? AND account = ?",
        )
        .bind(scope)
        .bind(destination)
        .bind(account)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get secret: {}",
                e
            )))
        })?;

        Ok(secret)
    }

    /// Store (or replace) the secret for a key
    pub async fn set_secret(
        &self,
        scope: &str,
        destination: &str,
        account: &str,
        secret: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO secrets (scope, destination, account, secret, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(scope, destination, account)
            DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at
            "#,
        )
        .bind(scope)
        .bind(destination)
        .bind(account)
        .bind(secret)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set secret: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Forget the secret for a key (e.g. after the remote rejected it)
    pub async fn delete_secret(&self, scope: &str, destination: &str, account: &str) -> Result<()> {
        sqlx::query("DELETE FROM secrets WHERE scope = ? AND destination = ? AND account = ?")
            .bind(scope)
            .bind(destination)
            .bind(account)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete secret: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
