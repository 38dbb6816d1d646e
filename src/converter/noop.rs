//! No-op converter for graceful degradation

use super::Converter;
use async_trait::async_trait;
use std::path::Path;

/// Converter used when no conversion tool is available
///
/// Every conversion fails with `Error::NotSupported`; delivery keeps the primary
/// artifact and records the destination as primary-only.
pub struct NoOpConverter;

#[async_trait]
impl Converter for NoOpConverter {
    async fn convert(&self, _source: &Path, _target: &Path) -> crate::Result<()> {
        Err(crate::Error::NotSupported(
            "conversion requires the external unoconv binary. \
             Configure converter_path in [tools] or ensure unoconv is in PATH."
                .into(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
