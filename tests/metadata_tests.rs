//! Round-trip and error-shape tests for the plugin-under-test metadata file.

use std::fs;
use std::path::PathBuf;

use forgekit::{
    IMPLEMENTATION_CLASSPATH_KEY, METADATA_FILE_NAME, MetadataError, read_plugin_metadata,
    write_plugin_metadata,
};
use tempfile::tempdir;

#[test]
fn generated_manifest_resolves_to_the_same_classpath() {
    let dir = tempdir().unwrap();
    let classpath = vec![PathBuf::from("/a/b.jar"), PathBuf::from("/c/d.jar")];

    let written = write_plugin_metadata(&classpath, dir.path()).unwrap();
    assert_eq!(written.file_name().unwrap(), METADATA_FILE_NAME);

    let resolved = read_plugin_metadata(&written).unwrap();
    assert_eq!(resolved, classpath);
}

#[test]
fn resolution_preserves_entry_order() {
    let dir = tempdir().unwrap();
    let classpath = vec![
        PathBuf::from("/z/last-by-name.jar"),
        PathBuf::from("/a/first-by-name.jar"),
        PathBuf::from("/m/middle.jar"),
    ];

    let written = write_plugin_metadata(&classpath, dir.path()).unwrap();
    assert_eq!(read_plugin_metadata(&written).unwrap(), classpath);
}

#[test]
fn empty_classpath_produces_a_manifest_without_the_key() {
    let dir = tempdir().unwrap();
    let written = write_plugin_metadata(&[], dir.path()).unwrap();

    let contents = fs::read_to_string(&written).unwrap();
    assert!(!contents.contains(IMPLEMENTATION_CLASSPATH_KEY));

    let err = read_plugin_metadata(&written).unwrap_err();
    assert!(matches!(err, MetadataError::MissingKey { .. }));
    assert!(err.to_string().contains(IMPLEMENTATION_CLASSPATH_KEY));
}

#[test]
fn repeated_generation_is_byte_identical() {
    let first_dir = tempdir().unwrap();
    let second_dir = tempdir().unwrap();
    let classpath = vec![PathBuf::from("/lib/plugin.jar"), PathBuf::from("/lib/api.jar")];

    let first = write_plugin_metadata(&classpath, first_dir.path()).unwrap();
    // Real time has moved on by the second invocation; contents must not
    // depend on it.
    let second = write_plugin_metadata(&classpath, second_dir.path()).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn generation_overwrites_an_existing_manifest() {
    let dir = tempdir().unwrap();
    write_plugin_metadata(&[PathBuf::from("/old/entry.jar")], dir.path()).unwrap();

    let written =
        write_plugin_metadata(&[PathBuf::from("/new/entry.jar")], dir.path()).unwrap();
    let resolved = read_plugin_metadata(&written).unwrap();
    assert_eq!(resolved, vec![PathBuf::from("/new/entry.jar")]);
}

#[test]
fn backslashes_are_normalized_to_forward_slashes() {
    let dir = tempdir().unwrap();
    let written =
        write_plugin_metadata(&[PathBuf::from(r"C:\plugins\under-test.jar")], dir.path()).unwrap();

    let contents = fs::read_to_string(&written).unwrap();
    assert!(contents.contains("C:/plugins/under-test.jar"));
    assert!(!contents.contains('\\'));
}

#[test]
fn missing_manifest_error_names_the_attempted_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(METADATA_FILE_NAME);

    let err = read_plugin_metadata(&path).unwrap_err();
    let MetadataError::Unreadable { path: reported, .. } = &err else {
        panic!("expected Unreadable, got {err:?}");
    };
    assert_eq!(reported, &path);
}

#[test]
fn write_failure_surfaces_as_io_error_naming_the_target() {
    let dir = tempdir().unwrap();
    let missing_dir = dir.path().join("does-not-exist");

    let err = write_plugin_metadata(&[PathBuf::from("/a.jar")], &missing_dir).unwrap_err();
    assert!(err.to_string().contains(METADATA_FILE_NAME));
}
