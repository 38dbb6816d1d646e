//! Utility functions for artifact naming and path derivation

use crate::error::{DeliveryError, Error, Result};
use std::path::{Component, Path, PathBuf};

/// Stem used when a display name sanitizes to nothing
const FALLBACK_STEM: &str = "certificat";

/// Longest stem kept, in characters
const MAX_STEM_CHARS: usize = 200;

/// Turn a display name into a file stem that is valid on every target filesystem
///
/// Path separators, characters reserved by SMB/Windows shares and control
/// characters become `_`. Leading and trailing dots and spaces are trimmed, since
/// shares silently drop them. Letters keep their case and accents.
///
/// # Examples
///
/// ```
/// use certpost::utils::sanitize_file_stem;
///
/// assert_eq!(sanitize_file_stem("Jean Tremblay"), "Jean Tremblay");
/// assert_eq!(sanitize_file_stem("a/b:c"), "a_b_c");
/// assert_eq!(sanitize_file_stem(" .. "), "certificat");
/// ```
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

/// Path of the primary artifact on a mounted destination
///
/// `<root>/<sub_path>/<folder>/<sanitized name>.<extension>`
///
/// # Errors
///
/// Returns [`DeliveryError::InvalidPath`] if `sub_path` is absolute or climbs out of
/// `root` through `..`, or if `folder` is not a single folder name.
pub fn primary_artifact_path(
    root: &Path,
    sub_path: &Path,
    folder: &str,
    display_name: &str,
    extension: &str,
) -> Result<PathBuf> {
    ensure_contained(sub_path)?;
    if !is_single_segment(folder) {
        return Err(Error::Delivery(DeliveryError::InvalidPath {
            path: PathBuf::from(folder),
            reason: "artifact folder must be a single folder name".to_string(),
        }));
    }

    Ok(root
        .join(sub_path)
        .join(folder)
        .join(format!("{}.{}", sanitize_file_stem(display_name), extension)))
}

/// Path of the converted artifact for a primary artifact
///
/// The converted file goes into a sibling folder at the same depth as the primary
/// folder and keeps the primary stem: `<...>/ppt/name.pptx` → `<...>/pdf/name.pdf`.
///
/// # Errors
///
/// Returns [`DeliveryError::InvalidPath`] if `primary` has no stem or no
/// grandparent directory.
pub fn secondary_artifact_path(primary: &Path, folder: &str, extension: &str) -> Result<PathBuf> {
    let invalid = |reason: &str| {
        Error::Delivery(DeliveryError::InvalidPath {
            path: primary.to_path_buf(),
            reason: reason.to_string(),
        })
    };

    let stem = primary
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("cannot extract file stem"))?;

    let base = primary
        .parent()
        .and_then(Path::parent)
        .ok_or_else(|| invalid("primary artifact has no parent folder"))?;

    Ok(base.join(folder).join(format!("{}.{}", stem, extension)))
}

/// Whether `path` stays below whatever directory it is joined onto
///
/// Absolute paths and any `..` component escape; an empty path does not.
pub fn is_contained(path: &Path) -> bool {
    !path.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Whether `name` is exactly one plain path component (no separators, `.` or `..`)
pub fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

fn ensure_contained(sub_path: &Path) -> Result<()> {
    if !is_contained(sub_path) {
        return Err(Error::Delivery(DeliveryError::InvalidPath {
            path: sub_path.to_path_buf(),
            reason: "sub path must stay inside the mount point".to_string(),
        }));
    }
    Ok(())
}
