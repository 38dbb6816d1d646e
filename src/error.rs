//! Error types for certpost
//!
//! Each pipeline stage has its own error enum so that callers can decide how far a
//! failure propagates:
//! - [`TemplateError`] aborts the delivery of a single record
//! - [`CredentialError`] and [`MountError`] abort a single destination
//! - [`ConverterError`] only loses the secondary artifact
//!
//! Nothing in this module ever formats a secret.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for certpost operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for certpost
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "template.path")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Form source could not be read
    #[error("form source error: {0}")]
    FormSource(#[from] FormSourceError),

    /// Template could not be loaded or filled
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Credential could not be resolved
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Remote volume could not be mounted or released
    #[error("mount error: {0}")]
    Mount(#[from] MountError),

    /// Conversion listener or conversion request failed
    #[error("converter error: {0}")]
    Converter(#[from] ConverterError),

    /// Artifact delivery failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not supported (missing binary, no terminal, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Stable machine-readable code, stored in the delivery ledger
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::Database(_) => "database",
            Error::FormSource(_) => "form_source",
            Error::Template(_) => "template",
            Error::Credential(CredentialError::StoreUnavailable { .. }) => {
                "credential_store_unavailable"
            }
            Error::Credential(_) => "credential",
            Error::Mount(MountError::CredentialRejected { .. }) => "credential_rejected",
            Error::Mount(_) => "mount",
            Error::Converter(_) => "conversion",
            Error::Delivery(DeliveryError::ConversionFailed { .. }) => "conversion",
            Error::Delivery(_) => "delivery",
            Error::Io(_) => "io",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "other",
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Form source errors
#[derive(Debug, Error)]
pub enum FormSourceError {
    /// The export could not be fetched
    #[error("failed to fetch form export from {location}: {reason}")]
    FetchFailed {
        /// File path or URL of the export
        location: String,
        /// Underlying failure
        reason: String,
    },

    /// The export is not a JSON array of objects
    #[error("malformed form export from {location}: {reason}")]
    Malformed {
        /// File path or URL of the export
        location: String,
        /// What was wrong with the payload
        reason: String,
    },
}

/// Template loading and rendering errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template file missing or unreadable
    #[error("cannot read template {path}: {reason}")]
    Unreadable {
        /// Template path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Template is not a valid presentation package
    #[error("corrupt template {path}: {reason}")]
    Corrupt {
        /// Template path
        path: PathBuf,
        /// What is wrong with the package
        reason: String,
    },

    /// The first slide does not contain a required marker
    #[error("template {path} has no '{marker}' placeholder on its first slide")]
    MissingPlaceholder {
        /// Template path
        path: PathBuf,
        /// Marker text that was expected
        marker: String,
    },
}

/// Credential resolution errors
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The backing secret store could not be reached
    #[error("secret store unavailable for {destination}: {reason}")]
    StoreUnavailable {
        /// Destination whose credential was requested
        destination: String,
        /// Underlying failure
        reason: String,
    },

    /// No interactive terminal is available to ask for the secret
    #[error("cannot prompt for the {destination} credential: {reason}")]
    PromptUnavailable {
        /// Destination whose credential was requested
        destination: String,
        /// Why prompting failed
        reason: String,
    },
}

/// Mount acquisition and release errors
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount command failed
    #[error("failed to mount {endpoint} on {mount_point}: {reason}")]
    MountFailed {
        /// Remote endpoint URL
        endpoint: String,
        /// Local mount point
        mount_point: PathBuf,
        /// Command output or spawn error
        reason: String,
    },

    /// The remote refused the credential
    #[error("{endpoint} rejected the credential for {mount_point}: {reason}")]
    CredentialRejected {
        /// Remote endpoint URL
        endpoint: String,
        /// Local mount point
        mount_point: PathBuf,
        /// Command output
        reason: String,
    },

    /// The unmount command failed
    #[error("failed to unmount {mount_point}: {reason}")]
    UnmountFailed {
        /// Local mount point
        mount_point: PathBuf,
        /// Command output or spawn error
        reason: String,
    },

    /// A `local` destination points at a directory that does not exist
    #[error("mount point {mount_point} is not a directory")]
    NotADirectory {
        /// Local mount point
        mount_point: PathBuf,
    },
}

/// Converter listener errors
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The listener process could not be spawned
    #[error("failed to start conversion listener: {0}")]
    StartFailed(String),

    /// The listener was never started
    #[error("conversion listener is not running")]
    NotRunning,

    /// The listener process exited
    #[error("conversion listener exited ({status})")]
    ListenerExited {
        /// Exit status reported by the OS
        status: String,
    },

    /// A single conversion failed
    #[error("conversion of {source_path} to {target_path} failed: {reason}")]
    ConversionFailed {
        /// Primary artifact
        source_path: PathBuf,
        /// Requested secondary artifact
        target_path: PathBuf,
        /// Converter output or spawn error
        reason: String,
    },
}

/// Delivery errors that need more context than the stage error alone
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Writing the primary artifact failed
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// Primary artifact path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The primary artifact was delivered but the secondary one was not produced
    #[error("delivered {primary_path} but conversion failed: {reason}")]
    ConversionFailed {
        /// Primary artifact that was delivered and kept
        primary_path: PathBuf,
        /// Conversion failure
        reason: String,
    },

    /// The output path could not be derived
    #[error("invalid output path {path}: {reason}")]
    InvalidPath {
        /// Offending path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },
}
