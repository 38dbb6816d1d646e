//! Form response sources
//!
//! A source yields only the rows that have not been handed to the pipeline yet.
//! Fetching is side-effect free; the rows of a batch are marked as seen by
//! [`FormSource::commit`] once the pipeline is done with them, so a run that dies
//! half-way sees the same rows again on the next run.

use crate::error::Result;
use crate::types::RawRow;
use async_trait::async_trait;

mod json;

pub use json::JsonExportSource;

/// New rows returned by one fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormBatch {
    /// Rows in export order, duplicates removed
    pub rows: Vec<RawRow>,
    /// Total rows in the export, including already seen ones
    pub total: usize,
}

impl FormBatch {
    /// Whether there is nothing new
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fingerprints of the rows in this batch
    pub fn fingerprints(&self) -> Vec<String> {
        self.rows.iter().map(RawRow::fingerprint).collect()
    }
}

/// Pull-based reader of form responses
#[async_trait]
pub trait FormSource: Send + Sync {
    /// Rows not committed by an earlier batch
    async fn fetch_new(&self) -> Result<FormBatch>;

    /// Mark every row of `batch` as processed
    async fn commit(&self, batch: &FormBatch) -> Result<()>;

    /// Name used in logs and seen-row tracking
    fn name(&self) -> &str;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
