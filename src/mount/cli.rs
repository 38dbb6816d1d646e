//! Mounter driving the system `mount`/`umount` binaries

use super::{MountRequest, Mounter};
use crate::config::{DestinationConfig, MountMethod, ToolsConfig};
use crate::error::{MountError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Mounts destinations with the system `mount` command
///
/// The credential never appears on the command line: `cifs` reads it from the
/// `PASSWD` environment variable and `davfs` from standard input. `local`
/// destinations are expected to be mounted already; only the directory is checked.
pub struct CliMounter {
    mount_binary: PathBuf,
    umount_binary: PathBuf,
}

impl CliMounter {
    /// Create a mounter with explicit binary paths
    pub fn new(mount_binary: PathBuf, umount_binary: PathBuf) -> Self {
        Self {
            mount_binary,
            umount_binary,
        }
    }

    /// Create a mounter from the tools configuration
    ///
    /// Configured paths win; otherwise the binaries are looked up in `PATH` when
    /// `search_path` is set, and finally used by bare name.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let locate = |configured: &Option<PathBuf>, name: &str| {
            configured
                .clone()
                .or_else(|| {
                    tools
                        .search_path
                        .then(|| which::which(name).ok())
                        .flatten()
                })
                .unwrap_or_else(|| PathBuf::from(name))
        };

        Self::new(
            locate(&tools.mount_path, "mount"),
            locate(&tools.umount_path, "umount"),
        )
    }

    fn mount_args(destination: &DestinationConfig, fs_type: &str) -> Vec<String> {
        let mut args = vec!["-t".to_string(), fs_type.to_string()];

        let options = match destination.method {
            MountMethod::Cifs | MountMethod::Davfs => {
                Some(format!("username={}", destination.account))
            }
            MountMethod::Nfs | MountMethod::Local => None,
        };
        if let Some(options) = options {
            args.push("-o".to_string());
            args.push(options);
        }

        args.push(destination.url.clone());
        args.push(destination.mount_point.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Mounter for CliMounter {
    async fn mount(&self, request: &MountRequest<'_>) -> Result<()> {
        let destination = request.destination;
        let mount_point = &destination.mount_point;

        let Some(fs_type) = destination.method.fs_type() else {
            return check_directory(mount_point).await;
        };

        tokio::fs::create_dir_all(mount_point)
            .await
            .map_err(|e| MountError::MountFailed {
                endpoint: destination.url.clone(),
                mount_point: mount_point.clone(),
                reason: format!("cannot create mount point: {}", e),
            })?;

        let mut command = Command::new(&self.mount_binary);
        command
            .args(Self::mount_args(destination, fs_type))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if destination.method == MountMethod::Cifs {
            command.env("PASSWD", request.secret.expose());
        }

        // The drive label only names the share for Windows hosts; mount ignores it
        debug!(
            destination = %destination.name,
            drive = %destination.drive,
            binary = %self.mount_binary.display(),
            fs_type,
            "mounting"
        );

        let failed = |reason: String| MountError::MountFailed {
            endpoint: destination.url.clone(),
            mount_point: mount_point.clone(),
            reason,
        };

        let mut child = command
            .spawn()
            .map_err(|e| failed(format!("failed to execute mount: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if destination.method == MountMethod::Davfs {
                let line = format!("{}\n", request.secret.expose());
                // A mount helper that exits before reading is reported through its status
                let _ = stdin.write_all(line.as_bytes()).await;
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failed(format!("failed to wait for mount: {}", e)))?;

        if !output.status.success() {
            let reason = command_failure(&output);
            if is_auth_failure(&reason) {
                return Err(MountError::CredentialRejected {
                    endpoint: destination.url.clone(),
                    mount_point: mount_point.clone(),
                    reason,
                }
                .into());
            }
            return Err(failed(reason).into());
        }
        Ok(())
    }

    async fn unmount(&self, destination: &DestinationConfig) -> Result<()> {
        if destination.method == MountMethod::Local {
            return Ok(());
        }

        let output = Command::new(&self.umount_binary)
            .arg(&destination.mount_point)
            .output()
            .await
            .map_err(|e| MountError::UnmountFailed {
                mount_point: destination.mount_point.clone(),
                reason: format!("failed to execute umount: {}", e),
            })?;

        if !output.status.success() {
            return Err(MountError::UnmountFailed {
                mount_point: destination.mount_point.clone(),
                reason: command_failure(&output),
            }
            .into());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli-mount"
    }
}

async fn check_directory(mount_point: &Path) -> Result<()> {
    match tokio::fs::metadata(mount_point).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        _ => Err(MountError::NotADirectory {
            mount_point: mount_point.to_path_buf(),
        }
        .into()),
    }
}

/// Whether mount helper output means the remote refused the account or secret
fn is_auth_failure(reason: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "permission denied",
        "access denied",
        "logon failure",
        "authentication",
        "401 unauthorized",
        "bad password",
    ];
    let reason = reason.to_lowercase();
    MARKERS.iter().any(|marker| reason.contains(marker))
}

fn command_failure(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        format!("exited with {}: {}", output.status, stderr)
    }
}
