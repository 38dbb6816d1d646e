use super::*;
use crate::config::MountMethod;
use crate::credentials::{MemorySecretStore, Secret, SecretStore, StaticPrompter};
use crate::error::{ConverterError, CredentialError, MountError};
use crate::types::Identifier;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Mutex;
use tempfile::TempDir;

/// Mounter that only records calls; the mount point is a plain directory
#[derive(Default)]
struct RecordingMounter {
    calls: Mutex<Vec<String>>,
    fail_mount: bool,
    /// Secret the remote refuses
    rejects: Option<&'static str>,
}

impl RecordingMounter {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mounter for RecordingMounter {
    async fn mount(&self, request: &MountRequest<'_>) -> Result<()> {
        self.calls.lock().unwrap().push(format!(
            "mount {} {}",
            request.destination.name,
            request.secret.expose()
        ));
        if self.rejects == Some(request.secret.expose()) {
            return Err(MountError::CredentialRejected {
                endpoint: request.destination.url.clone(),
                mount_point: request.destination.mount_point.clone(),
                reason: "mount error(13): Permission denied".into(),
            }
            .into());
        }
        if self.fail_mount {
            return Err(MountError::MountFailed {
                endpoint: request.destination.url.clone(),
                mount_point: request.destination.mount_point.clone(),
                reason: "permission denied".into(),
            }
            .into());
        }
        Ok(())
    }

    async fn unmount(&self, destination: &DestinationConfig) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unmount {}", destination.name));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Converter that copies the source, or fails like a dead listener
struct CopyConverter {
    fail: bool,
}

#[async_trait]
impl Converter for CopyConverter {
    async fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        if self.fail {
            return Err(ConverterError::ListenerExited {
                status: "exit status: 1".into(),
            }
            .into());
        }
        tokio::fs::create_dir_all(target.parent().unwrap()).await?;
        tokio::fs::copy(source, target).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

struct Harness {
    dir: TempDir,
    mounter: Arc<RecordingMounter>,
    prompter: Arc<StaticPrompter>,
}

impl Harness {
    fn new(fail_mount: bool) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            mounter: Arc::new(RecordingMounter {
                fail_mount,
                ..Default::default()
            }),
            prompter: Arc::new(StaticPrompter::new(["typed"])),
        }
    }

    fn channel(&self, store: MemorySecretStore, converter: CopyConverter) -> DeliveryChannel {
        let resolver = Arc::new(CredentialResolver::new(
            Arc::new(store),
            self.prompter.clone(),
        ));
        DeliveryChannel::new(
            resolver,
            self.mounter.clone(),
            Arc::new(converter),
            CredentialConfig::default(),
            ArtifactConfig::default(),
        )
    }

    fn destination(&self) -> DestinationConfig {
        DestinationConfig {
            name: "sst".into(),
            url: "//files.example.org/sst".into(),
            mount_point: self.dir.path().to_path_buf(),
            drive: String::new(),
            account: "certbot".into(),
            method: MountMethod::Cifs,
            sub_path: "laser".into(),
        }
    }
}

fn stored(secret: &str) -> MemorySecretStore {
    MemorySecretStore::with_secrets([(
        CredentialKey {
            scope: "system".into(),
            destination: "certpost.sst".into(),
            account: "certbot".into(),
        },
        Secret::new(secret),
    )])
}

fn record(name: &str) -> CanonicalRecord {
    CanonicalRecord {
        key: format!("key-{name}"),
        submission_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        identifier: Identifier::Number(1234567),
        email: "x@example.org".into(),
        display_name: name.into(),
    }
}

fn artifact(content: &[u8]) -> RenderedArtifact {
    RenderedArtifact::from_bytes(content.to_vec())
}

#[tokio::test]
async fn test_deliver_writes_primary_and_secondary() {
    let harness = Harness::new(false);
    let channel = harness.channel(stored("pw"), CopyConverter { fail: false });
    let destination = harness.destination();

    let paths = channel
        .deliver(&destination, &artifact(b"cert"), &record("Jean Tremblay"))
        .await
        .unwrap();

    let root = harness.dir.path();
    assert_eq!(paths.primary, root.join("laser/ppt/Jean Tremblay.pptx"));
    assert_eq!(paths.secondary, root.join("laser/pdf/Jean Tremblay.pdf"));
    assert_eq!(std::fs::read(&paths.primary).unwrap(), b"cert");
    assert_eq!(std::fs::read(&paths.secondary).unwrap(), b"cert");

    assert_eq!(harness.mounter.calls(), vec!["mount sst pw", "unmount sst"]);
    assert!(harness.prompter.asked().is_empty());
}

#[tokio::test]
async fn test_redelivery_overwrites_same_files() {
    let harness = Harness::new(false);
    let channel = harness.channel(stored("pw"), CopyConverter { fail: false });
    let destination = harness.destination();

    let first = channel
        .deliver(&destination, &artifact(b"v1"), &record("Ann"))
        .await
        .unwrap();
    let second = channel
        .deliver(&destination, &artifact(b"v2"), &record("Ann"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second.primary).unwrap(), b"v2");
    let entries = std::fs::read_dir(second.primary.parent().unwrap())
        .unwrap()
        .count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn test_conversion_failure_keeps_primary_and_releases() {
    let harness = Harness::new(false);
    let channel = harness.channel(stored("pw"), CopyConverter { fail: true });
    let destination = harness.destination();

    let result = channel
        .deliver(&destination, &artifact(b"cert"), &record("Ann"))
        .await;

    match result {
        Err(Error::Delivery(DeliveryError::ConversionFailed { primary_path, .. })) => {
            assert_eq!(std::fs::read(&primary_path).unwrap(), b"cert");
        }
        other => panic!("expected ConversionFailed, got {other:?}"),
    }
    assert!(!harness.dir.path().join("laser/pdf").exists());
    assert_eq!(harness.mounter.calls(), vec!["mount sst pw", "unmount sst"]);
}

#[tokio::test]
async fn test_missing_credential_is_prompted_once() {
    let harness = Harness::new(false);
    let channel = harness.channel(MemorySecretStore::new(), CopyConverter { fail: false });
    let destination = harness.destination();

    for name in ["A", "B"] {
        channel
            .deliver(&destination, &artifact(b"cert"), &record(name))
            .await
            .unwrap();
    }

    assert_eq!(harness.prompter.asked().len(), 1);
    assert_eq!(
        harness.mounter.calls(),
        vec!["mount sst typed", "unmount sst", "mount sst typed", "unmount sst"]
    );
}

#[tokio::test]
async fn test_mount_failure_writes_nothing() {
    let harness = Harness::new(true);
    let channel = harness.channel(stored("pw"), CopyConverter { fail: false });
    let destination = harness.destination();

    let result = channel
        .deliver(&destination, &artifact(b"cert"), &record("Ann"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Mount(MountError::MountFailed { .. }))
    ));
    assert!(!harness.dir.path().join("laser").exists());
    // Nothing to release when the mount never happened
    assert_eq!(harness.mounter.calls(), vec!["mount sst pw"]);
}

#[tokio::test]
async fn test_credential_outage_skips_mount() {
    struct DownStore;

    #[async_trait]
    impl SecretStore for DownStore {
        async fn get(&self, _key: &CredentialKey) -> Result<Option<Secret>> {
            Err(Error::Other("dbus unavailable".into()))
        }
        async fn set(&self, _key: &CredentialKey, _secret: &Secret) -> Result<()> {
            Err(Error::Other("dbus unavailable".into()))
        }
        async fn delete(&self, _key: &CredentialKey) -> Result<()> {
            Err(Error::Other("dbus unavailable".into()))
        }
        fn name(&self) -> &'static str {
            "down"
        }
    }

    let harness = Harness::new(false);
    let resolver = Arc::new(CredentialResolver::new(
        Arc::new(DownStore),
        harness.prompter.clone(),
    ));
    let channel = DeliveryChannel::new(
        resolver,
        harness.mounter.clone(),
        Arc::new(CopyConverter { fail: false }),
        CredentialConfig::default(),
        ArtifactConfig::default(),
    );

    let result = channel
        .deliver(&harness.destination(), &artifact(b"cert"), &record("Ann"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Credential(CredentialError::StoreUnavailable { .. }))
    ));
    assert!(harness.mounter.calls().is_empty());
}

#[tokio::test]
async fn test_escaping_sub_path_is_rejected_and_released() {
    let harness = Harness::new(false);
    let channel = harness.channel(stored("pw"), CopyConverter { fail: false });
    let mut destination = harness.destination();
    destination.sub_path = "../outside".into();

    let result = channel
        .deliver(&destination, &artifact(b"cert"), &record("Ann"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Delivery(DeliveryError::InvalidPath { .. }))
    ));
    assert_eq!(harness.mounter.calls(), vec!["mount sst pw", "unmount sst"]);
}

#[tokio::test]
async fn test_rejected_credential_is_forgotten_and_asked_again() {
    let harness = Harness::new(false);
    let mounter = Arc::new(RecordingMounter {
        rejects: Some("stale"),
        ..Default::default()
    });
    let store = Arc::new(stored("stale"));
    let resolver = Arc::new(CredentialResolver::new(
        store.clone(),
        harness.prompter.clone(),
    ));
    let channel = DeliveryChannel::new(
        resolver,
        mounter.clone(),
        Arc::new(CopyConverter { fail: false }),
        CredentialConfig::default(),
        ArtifactConfig::default(),
    );
    let destination = harness.destination();
    let key = CredentialKey::for_destination(&CredentialConfig::default(), &destination);

    let result = channel
        .deliver(&destination, &artifact(b"cert"), &record("Ann"))
        .await;
    assert!(matches!(
        result,
        Err(Error::Mount(MountError::CredentialRejected { .. }))
    ));
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(!harness.dir.path().join("laser").exists());

    channel
        .deliver(&destination, &artifact(b"cert"), &record("Ann"))
        .await
        .unwrap();
    assert_eq!(harness.prompter.asked(), vec![key.clone()]);
    assert_eq!(
        store.get(&key).await.unwrap(),
        Some(Secret::new("typed"))
    );
    assert_eq!(
        mounter.calls(),
        vec!["mount sst stale", "mount sst typed", "unmount sst"]
    );
}
