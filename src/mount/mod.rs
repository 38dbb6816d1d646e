//! Scoped access to destination volumes
//!
//! A destination is mounted for the duration of one delivery. [`MountedVolume`]
//! is the handle for that window: it is created by [`MountedVolume::acquire`] and
//! must be given back with [`MountedVolume::release`] on every exit path.

use crate::config::DestinationConfig;
use crate::credentials::Secret;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

mod cli;

pub use cli::CliMounter;

/// Everything needed to mount one destination
pub struct MountRequest<'a> {
    /// Destination being mounted
    pub destination: &'a DestinationConfig,
    /// Resolved credential for the destination account
    pub secret: &'a Secret,
}

impl fmt::Debug for MountRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("destination", &self.destination.name)
            .field("url", &self.destination.url)
            .field("mount_point", &self.destination.mount_point)
            .field("drive", &self.destination.drive)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Mounts and unmounts destination volumes
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Make the destination available at its mount point
    async fn mount(&self, request: &MountRequest<'_>) -> Result<()>;

    /// Undo [`Mounter::mount`]
    async fn unmount(&self, destination: &DestinationConfig) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// A mounted destination
///
/// Dropping it without calling [`MountedVolume::release`] leaves the volume mounted
/// and logs a warning.
#[must_use = "a mounted volume must be released"]
pub struct MountedVolume<'a> {
    mounter: &'a dyn Mounter,
    destination: &'a DestinationConfig,
    released: bool,
}

impl<'a> MountedVolume<'a> {
    /// Mount the destination and return the handle
    pub async fn acquire(mounter: &'a dyn Mounter, request: &MountRequest<'a>) -> Result<Self> {
        mounter.mount(request).await?;
        debug!(
            destination = %request.destination.name,
            mount_point = %request.destination.mount_point.display(),
            mounter = mounter.name(),
            "volume mounted"
        );

        Ok(Self {
            mounter,
            destination: request.destination,
            released: false,
        })
    }

    /// Directory where the volume is reachable
    pub fn root(&self) -> &Path {
        &self.destination.mount_point
    }

    /// Unmount the volume
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.mounter.unmount(self.destination).await?;
        debug!(destination = %self.destination.name, "volume released");
        Ok(())
    }
}

impl Drop for MountedVolume<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                destination = %self.destination.name,
                mount_point = %self.destination.mount_point.display(),
                "mounted volume dropped without release"
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
