//! Template, form export and configuration fixtures

use certpost::config::{Config, DestinationConfig, MountMethod};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Build a one-slide presentation whose slide holds `runs`, one run per entry
pub fn write_template(path: &Path, runs: &[&str]) {
    let runs: String = runs
        .iter()
        .map(|text| format!("<a:r><a:rPr lang=\"fr-CA\"/><a:t>{}</a:t></a:r>", text))
        .collect();
    let slide = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <p:sld xmlns:a=\"a\" xmlns:p=\"p\"><p:cSld><p:spTree><p:sp><p:txBody>\
         <a:bodyPr/><a:p>{}</a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
        runs
    );

    let entries = [
        (
            "[Content_Types].xml",
            "<?xml version=\"1.0\"?><Types xmlns=\"ct\"/>".to_string(),
        ),
        (
            "ppt/presentation.xml",
            "<p:presentation xmlns:p=\"p\" xmlns:r=\"r\"><p:sldIdLst>\
             <p:sldId id=\"256\" r:id=\"rId2\"/></p:sldIdLst></p:presentation>"
                .to_string(),
        ),
        (
            "ppt/_rels/presentation.xml.rels",
            "<Relationships><Relationship Id=\"rId2\" Type=\"slide\" \
             Target=\"slides/slide1.xml\"/></Relationships>"
                .to_string(),
        ),
        ("ppt/slides/slide1.xml", slide),
    ];

    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Text of the first slide of a delivered presentation
pub fn first_slide_text(path: &Path) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut slide = archive.by_name("ppt/slides/slide1.xml").unwrap();
    let mut text = String::new();
    std::io::Read::read_to_string(&mut slide, &mut text).unwrap();
    text
}

/// Write the form export read by [`test_config`]
pub fn write_export(dir: &Path, rows: serde_json::Value) {
    std::fs::write(dir.join("export.json"), rows.to_string()).unwrap();
}

/// A destination served from a local directory under `root`
pub fn local_destination(root: &Path, name: &str) -> DestinationConfig {
    let mount_point = root.join(name);
    std::fs::create_dir_all(&mount_point).unwrap();
    DestinationConfig {
        name: name.to_string(),
        url: String::new(),
        mount_point,
        drive: String::new(),
        account: "certbot".to_string(),
        method: MountMethod::Local,
        sub_path: PathBuf::from("laser"),
    }
}

/// Configuration rooted in `dir`, with a valid template and the given destinations
pub fn test_config(dir: &Path, destinations: Vec<DestinationConfig>) -> Config {
    write_template(
        &dir.join("certificat.pptx"),
        &["Certificat laser", "nom", "matricule", "Date: XXXX-XX"],
    );

    let mut config = Config::default();
    config.base_dir = dir.to_path_buf();
    config.form.name = "laser".to_string();
    config.form.location = "export.json".to_string();
    config.template.path = PathBuf::from("certificat.pptx");
    config.persistence.database_path = PathBuf::from("certpost.db");
    config.destinations = destinations;
    config
}

/// All regular files under `root`, relative and sorted
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Stand-in for unoconv: `--listener` sleeps, a conversion copies the source to the target
#[cfg(unix)]
pub fn fake_unoconv(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("unoconv");
    std::fs::write(
        &path,
        r#"#!/bin/sh
if [ "$1" = "--listener" ]; then
    exec sleep 30
fi
# -f <format> -o <target> <source>
cp "$5" "$4"
"#,
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Poll `condition` every few milliseconds until it holds, failing after `limit`
pub async fn wait_until(limit: std::time::Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {limit:?}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
