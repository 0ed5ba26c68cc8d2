//! Unit tests for configuration and graceful degradation
//!
//! Tests that manipulate NGO_ROOT_FOLDER or NGO_CONFIG are marked with
//! #[serial] so they never run in parallel with each other.

use ngo_common::config::{
    config_file_path, load_toml_config, write_toml_config, CompiledDefaults,
    RootFolderInitializer, RootFolderResolver, TomlConfig, CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert!(!root_folder.as_os_str().is_empty());
    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/ngo-test-env-folder");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/ngo-test-toml-folder")),
        ..TomlConfig::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml(&config)
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/ngo-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_arg_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/ngo-test-env-folder");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/ngo-test-cli-folder")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/ngo-test-cli-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_used_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/ngo-site")),
        ..TomlConfig::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml(&config)
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/srv/ngo-site"));
}

#[test]
fn test_initializer_paths() {
    let root = PathBuf::from("/tmp/ngo-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("ngo-site.db"));
    assert_eq!(initializer.media_path(), root.join("media"));
}

#[test]
fn test_initializer_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("root");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.media_path().is_dir());

    // Second call is a no-op
    initializer.ensure_directory_exists().unwrap();
}

#[test]
fn test_missing_toml_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.port, 5740);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
    assert_eq!(config.wizard.check_debounce_ms, 300);
    assert_eq!(config.database_max_lock_wait_ms, 5000);
}

#[test]
fn test_partial_toml_keeps_defaults_for_missing_keys() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ngo-media.toml");
    std::fs::write(
        &path,
        r#"
port = 6000

[uploads]
max_bytes = 2048

[wizard]
check_debounce_ms = 50
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.port, 6000);
    assert_eq!(config.uploads.max_bytes, 2048);
    assert_eq!(config.uploads.timeout_secs, 60);
    assert!(config
        .uploads
        .allowed_content_types
        .contains(&"image/png".to_string()));
    assert_eq!(config.wizard.check_debounce_ms, 50);
    assert_eq!(config.wizard.idle_timeout_secs, 1800);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_zero_upload_limit_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("zero.toml");
    std::fs::write(&path, "[uploads]\nmax_bytes = 0\n").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_write_then_load_preserves_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("conf").join("ngo-media.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/ngo"));
    config.uploads.public_base_url = "/assets".to_string();
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.root_folder, Some(PathBuf::from("/srv/ngo")));
    assert_eq!(loaded.uploads.public_base_url, "/assets");
}

#[test]
#[serial]
fn test_config_file_env_override() {
    env::set_var(CONFIG_FILE_ENV, "/tmp/ngo-explicit.toml");
    assert_eq!(config_file_path("ngo-media"), PathBuf::from("/tmp/ngo-explicit.toml"));
    env::remove_var(CONFIG_FILE_ENV);

    assert!(config_file_path("ngo-media").ends_with("ngo-media.toml"));
}
