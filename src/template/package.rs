//! Presentation package access
//!
//! A `.pptx` file is a zip archive of XML parts. Only the first slide is edited;
//! every other entry is carried through byte for byte, keeping its compression.

use crate::error::TemplateError;
use regex::Regex;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::FileOptions;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";
const FALLBACK_FIRST_SLIDE: &str = "ppt/slides/slide1.xml";

/// Upper bound on the buffer reserved from an entry's declared size
const MAX_ENTRY_RESERVE: u64 = 1 << 20;

struct Entry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// All entries of a presentation package, in archive order
pub(crate) struct Package {
    path: PathBuf,
    entries: Vec<Entry>,
}

impl Package {
    /// Read a package from disk
    pub(crate) fn open(path: &Path) -> Result<Self, TemplateError> {
        let bytes = std::fs::read(path).map_err(|e| TemplateError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(path, bytes)
    }

    /// Parse a package from memory; `path` is only used in errors
    pub(crate) fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, TemplateError> {
        let corrupt = |reason: String| TemplateError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| corrupt(format!("not a zip archive: {}", e)))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| corrupt(format!("failed to read entry {}: {}", index, e)))?;

            // The declared size comes from the archive and may be anything
            let mut data = Vec::with_capacity(file.size().min(MAX_ENTRY_RESERVE) as usize);
            file.read_to_end(&mut data)
                .map_err(|e| corrupt(format!("failed to read {}: {}", file.name(), e)))?;

            entries.push(Entry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Entry contents decoded as UTF-8 text
    pub(crate) fn text(&self, name: &str) -> Option<Result<&str, TemplateError>> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| {
                std::str::from_utf8(&entry.data).map_err(|e| TemplateError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("{} is not UTF-8: {}", name, e),
                })
            })
    }

    /// Replace the contents of an existing entry
    pub(crate) fn replace(&mut self, name: &str, data: Vec<u8>) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.name == name) {
            entry.data = data;
        }
    }

    /// Name of the part holding the first slide in presentation order
    ///
    /// Follows the first `sldId` of `ppt/presentation.xml` through the presentation
    /// relationships. Packages without that chain fall back to `ppt/slides/slide1.xml`.
    pub(crate) fn first_slide(&self) -> Result<String, TemplateError> {
        if let Some(name) = self.first_slide_from_relationships()? {
            if self.has_entry(&name) {
                return Ok(name);
            }
        }

        if self.has_entry(FALLBACK_FIRST_SLIDE) {
            return Ok(FALLBACK_FIRST_SLIDE.to_string());
        }

        Err(TemplateError::Corrupt {
            path: self.path.clone(),
            reason: "presentation has no slides".into(),
        })
    }

    /// Serialize the package back into a zip archive
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        let corrupt = |reason: String| TemplateError::Corrupt {
            path: self.path.clone(),
            reason,
        };

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            let options = FileOptions::default().compression_method(entry.compression);
            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(|e| corrupt(format!("failed to write {}: {}", entry.name, e)))?;
                continue;
            }

            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| corrupt(format!("failed to write {}: {}", entry.name, e)))?;
            writer
                .write_all(&entry.data)
                .map_err(|e| corrupt(format!("failed to write {}: {}", entry.name, e)))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| corrupt(format!("failed to finish archive: {}", e)))?;
        Ok(cursor.into_inner())
    }

    fn has_entry(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    fn first_slide_from_relationships(&self) -> Result<Option<String>, TemplateError> {
        let (Some(presentation), Some(rels)) =
            (self.text(PRESENTATION_PART), self.text(PRESENTATION_RELS))
        else {
            return Ok(None);
        };
        let (presentation, rels) = (presentation?, rels?);

        let Some(rel_id) = first_slide_rel_id(presentation) else {
            return Ok(None);
        };

        Ok(relationship_target(rels, &rel_id).map(|target| resolve_target("ppt", &target)))
    }
}

fn first_slide_rel_id(presentation: &str) -> Option<String> {
    let slide_id = Regex::new(r"<p:sldId\s[^>]*>").ok()?;
    let rel_attr = Regex::new(r#"\br:id\s*=\s*"([^"]+)""#).ok()?;

    let element = slide_id.find(presentation)?;
    rel_attr
        .captures(element.as_str())
        .map(|caps| caps[1].to_string())
}

fn relationship_target(rels: &str, rel_id: &str) -> Option<String> {
    let relationship = Regex::new(r"<Relationship\s[^>]*>").ok()?;
    let id_attr = Regex::new(r#"\bId\s*=\s*"([^"]+)""#).ok()?;
    let target_attr = Regex::new(r#"\bTarget\s*=\s*"([^"]+)""#).ok()?;

    relationship
        .find_iter(rels)
        .map(|m| m.as_str())
        .find(|element| {
            id_attr
                .captures(element)
                .is_some_and(|caps| &caps[1] == rel_id)
        })
        .and_then(|element| target_attr.captures(element))
        .map(|caps| caps[1].to_string())
}

/// Resolve a relationship target against the folder of its source part
fn resolve_target(base: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
