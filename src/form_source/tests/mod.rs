use super::*;
use crate::db::Database;
use crate::error::{Error, FormSourceError};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn database() -> (NamedTempFile, Arc<Database>) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(temp_file.path()).await.unwrap());
    (temp_file, db)
}

fn file_source(dir: &TempDir, db: Arc<Database>) -> JsonExportSource {
    JsonExportSource::new(
        "laser",
        "export.json",
        dir.path(),
        Duration::from_secs(5),
        db,
    )
    .unwrap()
}

fn write_export(dir: &TempDir, body: &serde_json::Value) {
    std::fs::write(dir.path().join("export.json"), body.to_string()).unwrap();
}

#[tokio::test]
async fn test_file_export_yields_rows_in_order() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    write_export(
        &dir,
        &json!([
            {"nom": "Ann", "matricule": 1},
            {"nom": "Bob", "matricule": 2}
        ]),
    );

    let source = file_source(&dir, db);
    let batch = source.fetch_new().await.unwrap();

    assert_eq!(batch.total, 2);
    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.rows[0].get("nom"), Some(&json!("Ann")));
    assert_eq!(batch.rows[1].get("nom"), Some(&json!("Bob")));
    assert_eq!(source.name(), "laser");
}

#[tokio::test]
async fn test_committed_rows_are_not_fetched_again() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    write_export(&dir, &json!([{"nom": "Ann"}]));
    let source = file_source(&dir, db.clone());

    let first = source.fetch_new().await.unwrap();
    assert_eq!(first.rows.len(), 1);

    // Not committed yet: the same row comes back
    let again = source.fetch_new().await.unwrap();
    assert_eq!(again.rows.len(), 1);

    source.commit(&first).await.unwrap();
    write_export(&dir, &json!([{"nom": "Ann"}, {"nom": "Bob"}]));

    let next = source.fetch_new().await.unwrap();
    assert_eq!(next.total, 2);
    assert_eq!(next.rows.len(), 1);
    assert_eq!(next.rows[0].get("nom"), Some(&json!("Bob")));
    assert_eq!(db.seen_row_count("laser").await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_rows_in_one_export_are_collapsed() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    write_export(&dir, &json!([{"nom": "Ann"}, {"nom": "Ann"}]));

    let batch = file_source(&dir, db).fetch_new().await.unwrap();
    assert_eq!(batch.total, 2);
    assert_eq!(batch.rows.len(), 1);
}

#[tokio::test]
async fn test_wrapped_exports_are_accepted() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    let source = file_source(&dir, db);

    write_export(&dir, &json!({"value": [{"nom": "Ann"}]}));
    assert_eq!(source.fetch_new().await.unwrap().rows.len(), 1);

    write_export(&dir, &json!({"rows": [{"nom": "Bob"}, {"nom": "Cy"}]}));
    assert_eq!(source.fetch_new().await.unwrap().rows.len(), 2);
}

#[tokio::test]
async fn test_malformed_exports() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    let source = file_source(&dir, db);

    std::fs::write(dir.path().join("export.json"), "{not json").unwrap();
    assert!(matches!(
        source.fetch_new().await,
        Err(Error::FormSource(FormSourceError::Malformed { .. }))
    ));

    write_export(&dir, &json!([{"nom": "Ann"}, 42]));
    match source.fetch_new().await {
        Err(Error::FormSource(FormSourceError::Malformed { reason, .. })) => {
            assert!(reason.contains("row 1"));
        }
        other => panic!("expected Malformed, got {other:?}"),
    }

    write_export(&dir, &json!({"data": []}));
    assert!(matches!(
        source.fetch_new().await,
        Err(Error::FormSource(FormSourceError::Malformed { .. }))
    ));
}

#[tokio::test]
async fn test_missing_file_is_a_fetch_failure() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;

    let result = file_source(&dir, db).fetch_new().await;
    assert!(matches!(
        result,
        Err(Error::FormSource(FormSourceError::FetchFailed { .. }))
    ));
}

#[tokio::test]
async fn test_http_export() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/laser.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"nom": "Ann", "matricule": "12"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_guard, db) = database().await;
    let source = JsonExportSource::new(
        "laser",
        &format!("{}/export/laser.json", server.uri()),
        Path::new("/unused"),
        Duration::from_secs(5),
        db,
    )
    .unwrap();

    let batch = source.fetch_new().await.unwrap();
    assert_eq!(batch.rows.len(), 1);
    assert_eq!(batch.rows[0].get("matricule"), Some(&json!("12")));
}

#[tokio::test]
async fn test_http_error_status_is_a_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (_guard, db) = database().await;
    let source = JsonExportSource::new(
        "laser",
        &server.uri(),
        Path::new("/unused"),
        Duration::from_secs(5),
        db,
    )
    .unwrap();

    match source.fetch_new().await {
        Err(Error::FormSource(FormSourceError::FetchFailed { reason, .. })) => {
            assert!(reason.contains("503"));
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_url_is_a_config_error() {
    let (_guard, db) = database().await;
    let result = JsonExportSource::new(
        "laser",
        "https://exa mple.org/x",
        Path::new("/"),
        Duration::from_secs(5),
        db,
    );
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn test_commit_of_empty_batch_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let (_guard, db) = database().await;
    let source = file_source(&dir, db.clone());

    source.commit(&FormBatch::default()).await.unwrap();
    assert_eq!(db.seen_row_count("laser").await.unwrap(), 0);
}
