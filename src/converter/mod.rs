//! Secondary-format conversion
//!
//! Conversion goes through an external office suite. [`ConverterService`] keeps one
//! `unoconv --listener` process alive for the lifetime of the application, so each
//! conversion only pays for a client invocation. When no converter binary is
//! available, [`NoOpConverter`] reports every conversion as unsupported and the
//! primary artifacts are still delivered.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

mod noop;
mod service;

pub use noop::NoOpConverter;
pub use service::ConverterService;

/// Converts a delivered artifact into the secondary format
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `source` into `target`, creating or replacing `target`
    async fn convert(&self, source: &Path, target: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
