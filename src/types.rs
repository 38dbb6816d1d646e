//! Core data types flowing through the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Unvalidated form response: column name → value
///
/// Columns are kept sorted so that the [`fingerprint`](RawRow::fingerprint) does not
/// depend on the column order of the export.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(pub BTreeMap<String, serde_json::Value>);

impl RawRow {
    /// Value of a column, if present
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    /// Set a column value
    pub fn insert(&mut self, column: impl Into<String>, value: serde_json::Value) {
        self.0.insert(column.into(), value);
    }

    /// Hex SHA-256 of the row's canonical JSON encoding
    pub fn fingerprint(&self) -> String {
        // BTreeMap serialization is ordered, so the encoding is canonical
        let encoded = serde_json::to_vec(&self.0).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, serde_json::Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, serde_json::Value)>>(iter: I) -> Self {
        RawRow(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Record identifier as found in the form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Parsed integer identifier
    Number(i64),
    /// Value that could not be parsed, kept verbatim
    Unparsed(String),
}

impl Default for Identifier {
    fn default() -> Self {
        Identifier::Number(0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Number(n) => write!(f, "{}", n),
            Identifier::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Normalized, fully defaulted record ready for rendering
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Fingerprint of the raw row this record came from
    pub key: String,
    /// Calendar date of the submission
    pub submission_date: NaiveDate,
    /// Identifier (0 when absent)
    pub identifier: Identifier,
    /// Contact email
    pub email: String,
    /// Name printed on the certificate and used as the file stem
    pub display_name: String,
}

/// Counters for one pipeline run
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Rows returned by the form source
    pub rows_fetched: usize,
    /// Records that rendered successfully
    pub records_rendered: usize,
    /// Records whose rendering failed
    pub render_failures: usize,
    /// (record, destination) pairs whose primary artifact was written
    pub primary_delivered: usize,
    /// (record, destination) pairs whose secondary artifact was produced
    pub secondary_delivered: usize,
    /// (record, destination) pairs where nothing was delivered
    pub delivery_failures: usize,
    /// (record, destination) pairs where only the primary artifact exists
    pub conversion_failures: usize,
    /// Whether the form source could be read at all
    pub source_failed: bool,
}

impl RunSummary {
    /// True when every record reached every destination in both formats
    pub fn is_clean(&self) -> bool {
        !self.source_failed
            && self.render_failures == 0
            && self.delivery_failures == 0
            && self.conversion_failures == 0
    }
}
