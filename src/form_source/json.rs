//! JSON export reader

use super::{FormBatch, FormSource};
use crate::config::FormConfig;
use crate::db::Database;
use crate::error::{Error, FormSourceError, Result};
use crate::types::RawRow;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Where the export lives
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Http(Url),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Http(url) => write!(f, "{}", url),
        }
    }
}

/// Reads a JSON export of form responses from a file or an HTTP(S) URL
///
/// The export is either an array of objects, or an object holding that array under
/// `rows` or `value`. Each object is one response, keyed by column name.
pub struct JsonExportSource {
    name: String,
    location: Location,
    db: Arc<Database>,
    http_client: reqwest::Client,
}

impl JsonExportSource {
    /// Create a source
    ///
    /// `location` is an `http://`/`https://` URL or a file path; relative paths are
    /// resolved against `base_dir`.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the HTTP client cannot be created
    pub fn new(
        name: impl Into<String>,
        location: &str,
        base_dir: &Path,
        timeout: Duration,
        db: Arc<Database>,
    ) -> Result<Self> {
        let location = if location.starts_with("http://") || location.starts_with("https://") {
            Location::Http(
                Url::parse(location)
                    .map_err(|e| Error::config("form.location", format!("invalid url: {}", e)))?,
            )
        } else {
            Location::File(base_dir.join(location))
        };

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("certpost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            location,
            db,
            http_client,
        })
    }

    /// Create a source from the `[form]` section
    pub fn from_config(config: &FormConfig, base_dir: &Path, db: Arc<Database>) -> Result<Self> {
        Self::new(
            config.name.clone(),
            &config.location,
            base_dir,
            config.timeout,
            db,
        )
    }

    async fn read_export(&self) -> Result<Vec<u8>> {
        let fetch_failed = |reason: String| FormSourceError::FetchFailed {
            location: self.location.to_string(),
            reason,
        };

        match &self.location {
            Location::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| Error::from(fetch_failed(e.to_string()))),
            Location::Http(url) => {
                let response = self
                    .http_client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| {
                        let reason = if e.is_timeout() {
                            "request timed out".to_string()
                        } else if e.is_connect() {
                            format!("connection failed: {}", e)
                        } else {
                            e.to_string()
                        };
                        fetch_failed(reason)
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(fetch_failed(format!("HTTP {}", status.as_u16())).into());
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| fetch_failed(format!("failed to read body: {}", e)))?;
                Ok(body.to_vec())
            }
        }
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<RawRow>> {
        let malformed = |reason: String| FormSourceError::Malformed {
            location: self.location.to_string(),
            reason,
        };

        let document: Value =
            serde_json::from_slice(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

        let items = match document {
            Value::Array(items) => items,
            Value::Object(mut object) => {
                match object.remove("rows").or_else(|| object.remove("value")) {
                    Some(Value::Array(items)) => items,
                    _ => return Err(malformed("expected an array of rows".into()).into()),
                }
            }
            _ => return Err(malformed("expected an array of rows".into()).into()),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(columns) => Ok(columns.into_iter().collect::<RawRow>()),
                other => Err(Error::from(malformed(format!(
                    "row {} is a {}, not an object",
                    index,
                    json_kind(&other)
                )))),
            })
            .collect()
    }
}

#[async_trait]
impl FormSource for JsonExportSource {
    async fn fetch_new(&self) -> Result<FormBatch> {
        let body = self.read_export().await?;
        let rows = self.parse(&body)?;
        let total = rows.len();

        let mut in_batch = HashSet::new();
        let mut fresh = Vec::new();
        for row in rows {
            let fingerprint = row.fingerprint();
            if !in_batch.insert(fingerprint.clone()) {
                continue;
            }
            if !self.db.is_row_seen(&self.name, &fingerprint).await? {
                fresh.push(row);
            }
        }

        debug!(
            source = %self.name,
            location = %self.location,
            total,
            new = fresh.len(),
            "form export read"
        );
        Ok(FormBatch { rows: fresh, total })
    }

    async fn commit(&self, batch: &FormBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.db
            .mark_rows_seen(&self.name, &batch.fingerprints())
            .await?;
        info!(source = %self.name, rows = batch.rows.len(), "form rows committed");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
