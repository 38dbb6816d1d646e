use super::*;
use crate::config::ToolsConfig;
use crate::error::{ConverterError, Error};
use std::path::PathBuf;
use tempfile::TempDir;

/// Stand-in for unoconv: `--listener` sleeps, otherwise copies `<source>` to `<target>`
#[cfg(unix)]
fn fake_unoconv(dir: &TempDir) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("unoconv");
    std::fs::write(
        &path,
        r#"#!/bin/sh
if [ "$1" = "--listener" ]; then
    exec sleep 30
fi
# -f <format> -o <target> <source>
if [ ! -f "$5" ]; then
    echo "cannot open $5" >&2
    exit 1
fi
cp "$5" "$4"
"#,
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_noop_converter_is_not_supported() {
    let result = NoOpConverter
        .convert(Path::new("a.pptx"), Path::new("a.pdf"))
        .await;
    assert!(matches!(result, Err(Error::NotSupported(_))));
    assert_eq!(NoOpConverter.name(), "noop");
}

#[test]
fn test_from_config_explicit_path() {
    let tools = ToolsConfig {
        converter_path: Some("/opt/libreoffice/unoconv".into()),
        ..ToolsConfig::default()
    };
    let service = ConverterService::from_config(&tools, "pdf").unwrap();
    assert_eq!(service.binary_path(), Path::new("/opt/libreoffice/unoconv"));
}

#[test]
fn test_from_config_without_path_or_search() {
    let tools = ToolsConfig {
        converter_path: None,
        search_path: false,
        ..ToolsConfig::default()
    };
    assert!(ConverterService::from_config(&tools, "pdf").is_none());
}

#[test]
fn test_from_path_consistency_with_which_crate() {
    let which_result = which::which("unoconv");
    let from_path_result = ConverterService::from_path("pdf");
    assert_eq!(which_result.is_ok(), from_path_result.is_some());
}

#[tokio::test]
async fn test_convert_before_start_is_not_running() {
    let service = ConverterService::new("/nonexistent/unoconv".into(), "pdf");
    let result = service
        .convert(Path::new("a.pptx"), Path::new("a.pdf"))
        .await;
    assert!(matches!(
        result,
        Err(Error::Converter(ConverterError::NotRunning))
    ));
}

#[tokio::test]
async fn test_start_with_missing_binary_fails() {
    let service = ConverterService::new("/nonexistent/unoconv".into(), "pdf");
    let result = service.start().await;
    assert!(matches!(
        result,
        Err(Error::Converter(ConverterError::StartFailed(_)))
    ));
    assert!(!service.is_running().await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_listener_lifecycle_and_conversion() {
    let dir = TempDir::new().unwrap();
    let service = ConverterService::new(fake_unoconv(&dir), "pdf");

    service.start().await.unwrap();
    // Second start keeps the same listener
    service.start().await.unwrap();
    assert!(service.is_running().await);

    let source = dir.path().join("ppt").join("Jean.pptx");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, b"slides").unwrap();
    let target = dir.path().join("pdf").join("Jean.pdf");

    service.convert(&source, &target).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"slides");

    service.stop().await;
    assert!(!service.is_running().await);

    // Stopping twice is harmless
    service.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_conversion_failure_reports_paths() {
    let dir = TempDir::new().unwrap();
    let service = ConverterService::new(fake_unoconv(&dir), "pdf");
    service.start().await.unwrap();

    let source = dir.path().join("missing.pptx");
    let target = dir.path().join("out").join("missing.pdf");
    let result = service.convert(&source, &target).await;

    match result {
        Err(Error::Converter(ConverterError::ConversionFailed {
            source_path,
            target_path,
            reason,
        })) => {
            assert_eq!(source_path, source);
            assert_eq!(target_path, target);
            assert!(reason.contains("cannot open"));
        }
        other => panic!("expected ConversionFailed, got {other:?}"),
    }

    service.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_dead_listener_fails_conversions() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("short-lived");
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let service = ConverterService::new(script, "pdf");
    service.start().await.unwrap();

    // Give the listener time to exit
    for _ in 0..50 {
        if !service.is_running().await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let result = service
        .convert(Path::new("a.pptx"), &dir.path().join("a.pdf"))
        .await;
    assert!(matches!(
        result,
        Err(Error::Converter(ConverterError::ListenerExited { .. }))
    ));
}
