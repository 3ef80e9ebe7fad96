use super::*;

use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Sample {
    size: u32,
    #[serde(default)]
    enabled: bool,
}

fn write_settings(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn settings_path_ends_with_app_dir() {
    let path = settings_path();
    assert!(path.ends_with("gameid/settings.toml"));
}

#[test]
fn loads_named_table() {
    let (_dir, path) = write_settings("[other]\nsize = 1\n\n[sample]\nsize = 42\nenabled = true\n");
    let sample: Option<Sample> = load_section_from(&path, "sample");
    assert_eq!(
        sample,
        Some(Sample {
            size: 42,
            enabled: true
        })
    );
}

#[test]
fn missing_table_is_none() {
    let (_dir, path) = write_settings("[other]\nsize = 1\n");
    let sample: Option<Sample> = load_section_from(&path, "sample");
    assert!(sample.is_none());
}

#[test]
fn missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let sample: Option<Sample> = load_section_from(&dir.path().join("nope.toml"), "sample");
    assert!(sample.is_none());
}

#[test]
fn malformed_file_is_none() {
    let (_dir, path) = write_settings("this is = = not toml");
    let sample: Option<Sample> = load_section_from(&path, "sample");
    assert!(sample.is_none());
}

#[test]
fn wrong_field_type_is_none() {
    let (_dir, path) = write_settings("[sample]\nsize = \"big\"\n");
    let sample: Option<Sample> = load_section_from(&path, "sample");
    assert!(sample.is_none());
}
