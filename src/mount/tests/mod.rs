use super::*;
use crate::config::MountMethod;
use crate::error::MountError;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingMounter {
    calls: Mutex<Vec<String>>,
    fail_unmount: bool,
}

impl RecordingMounter {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mounter for RecordingMounter {
    async fn mount(&self, request: &MountRequest<'_>) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("mount {}", request.destination.name));
        Ok(())
    }

    async fn unmount(&self, destination: &DestinationConfig) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unmount {}", destination.name));
        if self.fail_unmount {
            return Err(MountError::UnmountFailed {
                mount_point: destination.mount_point.clone(),
                reason: "target is busy".into(),
            }
            .into());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn destination() -> DestinationConfig {
    DestinationConfig {
        name: "sst".into(),
        url: "//files.example.org/sst".into(),
        mount_point: "/mnt/sst".into(),
        drive: "S:".into(),
        account: "certbot".into(),
        method: MountMethod::Cifs,
        sub_path: PathBuf::new(),
    }
}

#[tokio::test]
async fn test_acquire_and_release() {
    let mounter = RecordingMounter::default();
    let destination = destination();
    let secret = Secret::new("pw");
    let request = MountRequest {
        destination: &destination,
        secret: &secret,
    };

    let volume = MountedVolume::acquire(&mounter, &request).await.unwrap();
    assert_eq!(volume.root(), Path::new("/mnt/sst"));
    volume.release().await.unwrap();

    assert_eq!(mounter.calls(), vec!["mount sst", "unmount sst"]);
}

#[tokio::test]
async fn test_release_failure_is_reported() {
    let mounter = RecordingMounter {
        fail_unmount: true,
        ..Default::default()
    };
    let destination = destination();
    let secret = Secret::new("pw");
    let request = MountRequest {
        destination: &destination,
        secret: &secret,
    };

    let volume = MountedVolume::acquire(&mounter, &request).await.unwrap();
    let result = volume.release().await;
    assert!(matches!(
        result,
        Err(crate::Error::Mount(MountError::UnmountFailed { .. }))
    ));
}

#[test]
fn test_request_debug_hides_secret() {
    let destination = destination();
    let secret = Secret::new("hunter2");
    let request = MountRequest {
        destination: &destination,
        secret: &secret,
    };

    let rendered = format!("{:?}", request);
    assert!(rendered.contains("sst"));
    assert!(rendered.contains("drive: \"S:\""));
    assert!(!rendered.contains("hunter2"));
}
