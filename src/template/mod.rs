//! Certificate template rendering
//!
//! The template is a `.pptx` presentation whose first slide contains three kinds of
//! placeholder runs, each written by the template author as a plain word:
//!
//! - a run whose whole text is the name marker (`nom`)
//! - a run whose whole text is the identifier marker (`matricule`)
//! - a run whose text starts with the date prefix (`Date`)
//!
//! [`TemplateRenderer::render`] reloads the template from disk for every record and
//! returns the filled package as a [`RenderedArtifact`].

use crate::config::TemplateConfig;
use crate::error::{Result, TemplateError};
use crate::types::CanonicalRecord;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

mod package;
mod slide;

use package::Package;
use slide::{RunScanner, Substitutions};

/// File extension of rendered artifacts
pub const ARTIFACT_EXTENSION: &str = "pptx";

/// Placeholder kinds recognised on the first slide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Replaced by the display name
    Name,
    /// Replaced by the identifier
    Identifier,
    /// Replaced by the render-time date stamp
    Date,
}

impl Marker {
    /// Markers a usable template must contain
    pub const REQUIRED: [Marker; 2] = [Marker::Name, Marker::Identifier];
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Marker::Name => "name",
            Marker::Identifier => "identifier",
            Marker::Date => "date",
        };
        f.write_str(name)
    }
}

/// Marker texts as written in the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    name: String,
    identifier: String,
    date_prefix: String,
}

impl MarkerSet {
    /// Create a marker set from the three sentinel texts
    pub fn new(
        name: impl Into<String>,
        identifier: impl Into<String>,
        date_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            date_prefix: date_prefix.into(),
        }
    }

    /// Which marker, if any, a run's text is
    ///
    /// Exact comparison for name and identifier, prefix comparison for the date.
    pub fn classify(&self, text: &str) -> Option<Marker> {
        if text == self.name {
            Some(Marker::Name)
        } else if text == self.identifier {
            Some(Marker::Identifier)
        } else if !self.date_prefix.is_empty() && text.starts_with(&self.date_prefix) {
            Some(Marker::Date)
        } else {
            None
        }
    }

    /// Template text of a marker, for error messages
    pub fn text(&self, marker: Marker) -> &str {
        match marker {
            Marker::Name => &self.name,
            Marker::Identifier => &self.identifier,
            Marker::Date => &self.date_prefix,
        }
    }
}

/// A filled certificate, held in memory until delivered
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    bytes: Vec<u8>,
}

impl RenderedArtifact {
    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Package contents
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        ARTIFACT_EXTENSION
    }

    /// Write the artifact to `path`, replacing any existing file
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, &self.bytes).await
    }
}

impl fmt::Debug for RenderedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedArtifact")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Fills the certificate template for one record at a time
pub struct TemplateRenderer {
    path: PathBuf,
    markers: MarkerSet,
    date_label: String,
    scanner: RunScanner,
}

impl TemplateRenderer {
    /// Create a renderer and check that the template can be read
    ///
    /// A missing or corrupt template is an error. A template lacking a required
    /// marker only logs a warning here; every render of it will fail.
    pub fn open(path: impl Into<PathBuf>, config: &TemplateConfig) -> Result<Self> {
        let renderer = Self {
            path: path.into(),
            markers: MarkerSet::new(
                config.name_marker.clone(),
                config.identifier_marker.clone(),
                config.date_prefix.clone(),
            ),
            date_label: config.date_label.clone(),
            scanner: RunScanner::new()?,
        };

        let package = Package::open(&renderer.path)?;
        let slide_name = package.first_slide()?;
        let found = renderer.scan(&package, &slide_name)?;

        for marker in Marker::REQUIRED {
            if !found.contains(&marker) {
                warn!(
                    template = %renderer.path.display(),
                    slide = %slide_name,
                    marker = renderer.markers.text(marker),
                    "template first slide has no {} placeholder",
                    marker
                );
            }
        }

        debug!(template = %renderer.path.display(), slide = %slide_name, "template loaded");
        Ok(renderer)
    }

    /// Template path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render `record` with the current local time as date stamp
    pub fn render(&self, record: &CanonicalRecord) -> Result<RenderedArtifact> {
        self.render_at(record, Local::now())
    }

    /// Render `record` with the date stamp taken from `now`
    pub fn render_at(
        &self,
        record: &CanonicalRecord,
        now: DateTime<Local>,
    ) -> Result<RenderedArtifact> {
        // Fresh copy per record; nothing filled for one record can leak into the next
        let mut package = Package::open(&self.path)?;
        let slide_name = package.first_slide()?;

        let identifier = record.identifier.to_string();
        let date_stamp = self.date_stamp(now);
        let values = Substitutions {
            name: &record.display_name,
            identifier: &identifier,
            date_stamp: &date_stamp,
        };

        let filled = match package.text(&slide_name) {
            Some(xml) => self.scanner.fill(xml?, &self.markers, &values),
            None => {
                return Err(TemplateError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("missing slide part {}", slide_name),
                }
                .into());
            }
        };

        for marker in Marker::REQUIRED {
            if !filled.found.contains(&marker) {
                return Err(TemplateError::MissingPlaceholder {
                    path: self.path.clone(),
                    marker: self.markers.text(marker).to_string(),
                }
                .into());
            }
        }

        package.replace(&slide_name, filled.xml.into_bytes());
        let bytes = package.to_bytes()?;

        debug!(
            record = %record.key,
            markers = filled.found.len(),
            bytes = bytes.len(),
            "rendered certificate"
        );
        Ok(RenderedArtifact { bytes })
    }

    /// `"<label>: YYYY-MM"` for the given instant
    pub fn date_stamp(&self, now: DateTime<Local>) -> String {
        format!("{}: {}", self.date_label, now.format("%Y-%m"))
    }

    fn scan(&self, package: &Package, slide_name: &str) -> Result<Vec<Marker>> {
        let xml = match package.text(slide_name) {
            Some(xml) => xml?,
            None => return Ok(Vec::new()),
        };
        let values = Substitutions {
            name: "",
            identifier: "",
            date_stamp: "",
        };
        Ok(self.scanner.fill(xml, &self.markers, &values).found)
    }
}
