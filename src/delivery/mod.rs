//! Delivery of rendered certificates to destinations
//!
//! One call to [`DeliveryChannel::deliver`] covers one (record, destination) pair:
//!
//! 1. resolve the destination credential
//! 2. mount the destination
//! 3. write the primary artifact under `<sub_path>/<primary_folder>/`
//! 4. convert it into the sibling `<secondary_folder>/`
//! 5. unmount, whatever happened in steps 3 and 4
//!
//! Output names depend only on the record's display name, so delivering the same
//! record twice overwrites the same two files.

use crate::config::{ArtifactConfig, CredentialConfig, DestinationConfig};
use crate::converter::Converter;
use crate::credentials::{CredentialKey, CredentialResolver};
use crate::error::{DeliveryError, Error, MountError, Result};
use crate::mount::{MountRequest, MountedVolume, Mounter};
use crate::template::RenderedArtifact;
use crate::types::CanonicalRecord;
use crate::utils::{primary_artifact_path, secondary_artifact_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Files produced on a destination by a successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredPaths {
    /// Primary artifact
    pub primary: PathBuf,
    /// Converted artifact
    pub secondary: PathBuf,
}

/// Writes artifacts into mounted destinations and triggers conversion
pub struct DeliveryChannel {
    resolver: Arc<CredentialResolver>,
    mounter: Arc<dyn Mounter>,
    converter: Arc<dyn Converter>,
    credentials: CredentialConfig,
    artifacts: ArtifactConfig,
}

impl DeliveryChannel {
    /// Create a channel
    pub fn new(
        resolver: Arc<CredentialResolver>,
        mounter: Arc<dyn Mounter>,
        converter: Arc<dyn Converter>,
        credentials: CredentialConfig,
        artifacts: ArtifactConfig,
    ) -> Self {
        Self {
            resolver,
            mounter,
            converter,
            credentials,
            artifacts,
        }
    }

    /// Deliver one artifact to one destination
    ///
    /// # Errors
    ///
    /// - credential and mount failures abort before anything is written
    /// - [`MountError::CredentialRejected`] also forgets the stored secret, so the
    ///   next run prompts for a new one
    /// - [`DeliveryError::WriteFailed`] if the primary artifact cannot be written
    /// - [`DeliveryError::ConversionFailed`] if the primary artifact was written
    ///   but the secondary one was not produced; the primary file is kept
    pub async fn deliver(
        &self,
        destination: &DestinationConfig,
        artifact: &RenderedArtifact,
        record: &CanonicalRecord,
    ) -> Result<DeliveredPaths> {
        let key = CredentialKey::for_destination(&self.credentials, destination);
        let secret = self.resolver.resolve(&key).await?;

        let request = MountRequest {
            destination,
            secret: &secret,
        };
        let volume = match MountedVolume::acquire(self.mounter.as_ref(), &request).await {
            Ok(volume) => volume,
            Err(e @ Error::Mount(MountError::CredentialRejected { .. })) => {
                match self.resolver.forget(&key).await {
                    Ok(()) => warn!(
                        destination = %destination.name,
                        key = %key,
                        "credential rejected, it will be asked again next run"
                    ),
                    Err(forget_error) => warn!(
                        destination = %destination.name,
                        key = %key,
                        error = %forget_error,
                        "credential rejected but could not be forgotten"
                    ),
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let result = self
            .write_and_convert(volume.root(), destination, artifact, record)
            .await;

        if let Err(e) = volume.release().await {
            warn!(
                destination = %destination.name,
                error = %e,
                "failed to release destination volume"
            );
        }

        result
    }

    async fn write_and_convert(
        &self,
        root: &Path,
        destination: &DestinationConfig,
        artifact: &RenderedArtifact,
        record: &CanonicalRecord,
    ) -> Result<DeliveredPaths> {
        let primary = primary_artifact_path(
            root,
            &destination.sub_path,
            &self.artifacts.primary_folder,
            &record.display_name,
            artifact.extension(),
        )?;

        let write_failed = |e: std::io::Error| {
            Error::Delivery(DeliveryError::WriteFailed {
                path: primary.clone(),
                reason: e.to_string(),
            })
        };
        if let Some(parent) = primary.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed)?;
        }
        artifact.write_to(&primary).await.map_err(write_failed)?;
        debug!(
            destination = %destination.name,
            path = %primary.display(),
            "primary artifact written"
        );

        let secondary = secondary_artifact_path(
            &primary,
            &self.artifacts.secondary_folder,
            &self.artifacts.secondary_format,
        )?;

        self.converter
            .convert(&primary, &secondary)
            .await
            .map_err(|e| {
                Error::Delivery(DeliveryError::ConversionFailed {
                    primary_path: primary.clone(),
                    reason: e.to_string(),
                })
            })?;

        info!(
            destination = %destination.name,
            record = %record.key,
            primary = %primary.display(),
            secondary = %secondary.display(),
            "certificate delivered"
        );

        Ok(DeliveredPaths { primary, secondary })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
