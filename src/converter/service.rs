//! Long-running `unoconv` listener

use super::Converter;
use crate::config::ToolsConfig;
use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Name of the converter binary looked up in `PATH`
const CONVERTER_BINARY: &str = "unoconv";

/// Handle on the conversion listener process
///
/// [`ConverterService::start`] spawns the listener once; [`ConverterService::stop`]
/// terminates and reaps it. The listener is not restarted: once it has exited,
/// every conversion fails with [`ConverterError::ListenerExited`] until the
/// process restarts.
pub struct ConverterService {
    binary_path: PathBuf,
    format: String,
    listener: Mutex<Option<Child>>,
}

impl ConverterService {
    /// Create a service with an explicit binary path and output format
    pub fn new(binary_path: PathBuf, format: impl Into<String>) -> Self {
        Self {
            binary_path,
            format: format.into(),
            listener: Mutex::new(None),
        }
    }

    /// Attempt to find `unoconv` in PATH
    pub fn from_path(format: impl Into<String>) -> Option<Self> {
        which::which(CONVERTER_BINARY)
            .ok()
            .map(|path| Self::new(path, format))
    }

    /// Locate the converter from the tools configuration
    ///
    /// Returns `None` when no path is configured and PATH search is disabled or
    /// finds nothing.
    pub fn from_config(tools: &ToolsConfig, format: impl Into<String>) -> Option<Self> {
        match &tools.converter_path {
            Some(path) => Some(Self::new(path.clone(), format)),
            None if tools.search_path => Self::from_path(format),
            None => None,
        }
    }

    /// Binary used for the listener and conversions
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Spawn the listener; a no-op when it is already running
    pub async fn start(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let child = Command::new(&self.binary_path)
            .arg("--listener")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConverterError::StartFailed(format!(
                    "failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        info!(pid = ?child.id(), binary = %self.binary_path.display(), "conversion listener started");
        *listener = Some(child);
        Ok(())
    }

    /// Whether the listener was started and has not exited
    pub async fn is_running(&self) -> bool {
        let mut listener = self.listener.lock().await;
        match listener.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate and reap the listener
    pub async fn stop(&self) {
        let Some(mut child) = self.listener.lock().await.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "conversion listener already gone");
        }
        match child.wait().await {
            Ok(status) => info!(%status, "conversion listener stopped"),
            Err(e) => warn!(error = %e, "failed to reap conversion listener"),
        }
    }

    async fn ensure_listener(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        let child = listener.as_mut().ok_or(ConverterError::NotRunning)?;

        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(ConverterError::ListenerExited {
                status: status.to_string(),
            }
            .into()),
            Err(e) => Err(ConverterError::ListenerExited {
                status: format!("unknown: {}", e),
            }
            .into()),
        }
    }
}

#[async_trait]
impl Converter for ConverterService {
    async fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        self.ensure_listener().await?;

        let failed = |reason: String| ConverterError::ConversionFailed {
            source_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
            reason,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("cannot create output folder: {}", e)))?;
        }

        let output = Command::new(&self.binary_path)
            .arg("-f")
            .arg(&self.format)
            .arg("-o")
            .arg(target)
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| failed(format!("failed to execute {}: {}", CONVERTER_BINARY, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!("exited with {}: {}", output.status, stderr.trim())).into());
        }

        debug!(source = %source.display(), target = %target.display(), "converted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "unoconv"
    }
}
