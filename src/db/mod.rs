//! Database layer for certpost
//!
//! Handles SQLite persistence for everything that must survive a restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`secrets`]: Persisted destination credentials
//! - [`seen_rows`]: Form rows already handed to the pipeline
//! - [`deliveries`]: Delivery ledger, one row per (record, destination)

use sqlx::{FromRow, sqlite::SqlitePool};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

mod deliveries;
mod migrations;
mod secrets;
mod seen_rows;

/// Outcome of delivering one record to one destination
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Primary and secondary artifacts are both in place
    Delivered,
    /// Primary artifact written, conversion failed
    PrimaryOnly,
    /// Nothing was written (credential, mount or write failure)
    Failed,
}

impl DeliveryStatus {
    /// Text stored in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::PrimaryOnly => "primary_only",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(DeliveryStatus::Delivered),
            "primary_only" => Ok(DeliveryStatus::PrimaryOnly),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// Delivery outcome to be recorded in the ledger
#[derive(Debug, Clone)]
pub struct NewDelivery {
    /// Fingerprint of the source row
    pub record_key: String,
    /// Destination name
    pub destination: String,
    /// Display name the artifact was named after
    pub display_name: String,
    /// Outcome
    pub status: DeliveryStatus,
    /// Primary artifact path, when written
    pub primary_path: Option<PathBuf>,
    /// Secondary artifact path, when produced
    pub secondary_path: Option<PathBuf>,
    /// Machine-readable error code (see [`crate::Error::error_code`])
    pub error_code: Option<String>,
    /// Human-readable error
    pub error_message: Option<String>,
}

/// Delivery ledger row
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRow {
    /// Fingerprint of the source row
    pub record_key: String,
    /// Destination name
    pub destination: String,
    /// Display name the artifact was named after
    pub display_name: String,
    /// Outcome, see [`DeliveryStatus`]
    pub status: String,
    /// Primary artifact path
    pub primary_path: Option<String>,
    /// Secondary artifact path
    pub secondary_path: Option<String>,
    /// Machine-readable error code
    pub error_code: Option<String>,
    /// Human-readable error
    pub error_message: Option<String>,
    /// Number of times this pair was attempted
    pub attempts: i64,
    /// Unix timestamp of the last attempt
    pub updated_at: i64,
}

impl DeliveryRow {
    /// Parsed status; unknown values read as [`DeliveryStatus::Failed`]
    pub fn status(&self) -> DeliveryStatus {
        self.status.parse().unwrap_or(DeliveryStatus::Failed)
    }
}

/// Database handle for certpost
pub struct Database {
    pool: SqlitePool,
}
