use super::*;
use crate::config::MountMethod;
use crate::error::{CredentialError, MountError};
use crate::types::Identifier;
use chrono::NaiveDate;
use std::path::PathBuf;

fn destination() -> DestinationConfig {
    DestinationConfig {
        name: "sst".into(),
        url: "//files.example.org/sst".into(),
        mount_point: "/mnt/sst".into(),
        drive: String::new(),
        account: "certbot".into(),
        method: MountMethod::Cifs,
        sub_path: PathBuf::new(),
    }
}

fn record() -> CanonicalRecord {
    CanonicalRecord {
        key: "abc123".into(),
        submission_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        identifier: Identifier::Number(42),
        email: "ann@example.org".into(),
        display_name: "Ann".into(),
    }
}

#[test]
fn test_classify_full_delivery() {
    let outcome = classify(
        &destination(),
        &record(),
        Ok(DeliveredPaths {
            primary: "/mnt/sst/ppt/Ann.pptx".into(),
            secondary: "/mnt/sst/pdf/Ann.pdf".into(),
        }),
    );

    assert_eq!(outcome.status, DeliveryStatus::Delivered);
    assert_eq!(outcome.record_key, "abc123");
    assert_eq!(outcome.destination, "sst");
    assert_eq!(
        outcome.secondary_path.as_deref(),
        Some(std::path::Path::new("/mnt/sst/pdf/Ann.pdf"))
    );
    assert!(outcome.error_code.is_none());
}

#[test]
fn test_classify_conversion_failure_is_primary_only() {
    let outcome = classify(
        &destination(),
        &record(),
        Err(Error::Delivery(DeliveryError::ConversionFailed {
            primary_path: "/mnt/sst/ppt/Ann.pptx".into(),
            reason: "conversion listener exited (exit status: 1)".into(),
        })),
    );

    assert_eq!(outcome.status, DeliveryStatus::PrimaryOnly);
    assert_eq!(
        outcome.primary_path.as_deref(),
        Some(std::path::Path::new("/mnt/sst/ppt/Ann.pptx"))
    );
    assert!(outcome.secondary_path.is_none());
    assert_eq!(outcome.error_code.as_deref(), Some("conversion"));
}

#[test]
fn test_classify_failures_keep_error_code() {
    let store = classify(
        &destination(),
        &record(),
        Err(Error::Credential(CredentialError::StoreUnavailable {
            destination: "certpost.sst".into(),
            reason: "locked".into(),
        })),
    );
    assert_eq!(store.status, DeliveryStatus::Failed);
    assert_eq!(
        store.error_code.as_deref(),
        Some("credential_store_unavailable")
    );

    let mount = classify(
        &destination(),
        &record(),
        Err(Error::Mount(MountError::NotADirectory {
            mount_point: "/mnt/sst".into(),
        })),
    );
    assert_eq!(mount.status, DeliveryStatus::Failed);
    assert_eq!(mount.error_code.as_deref(), Some("mount"));
    assert!(mount.primary_path.is_none());
}
