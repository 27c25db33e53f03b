//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, serialization and the
//! conversion into window options.

use super::*;
use anyhow::Result;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = HelloConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.window.min_width, 800);
    assert_eq!(config.window.min_height, 600);
    assert_eq!(config.window.title, "Hello Wayland");
    assert!(config.window.server_side_decorations);
    assert_eq!(config.cursor.name, "default");
    assert_eq!(config.cursor.size, None);
    assert_eq!(config.render.color_step, 1);
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let mut original = HelloConfig::default();
    original.cursor.size = Some(24);
    original.cursor.theme = Some("Adwaita".to_string());

    let toml_string = toml::to_string(&original)?;
    let deserialized: HelloConfig = toml::from_str(&toml_string)?;

    assert_eq!(original, deserialized);
    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.toml");

    let config_content = r#"
[window]
title = "Colour Cycle"
min_width = 1024
min_height = 768
server_side_decorations = false

[cursor]
name = "left_ptr"
size = 32

[render]
color_step = 3
"#;
    fs::write(&config_path, config_content)?;

    let config = HelloConfig::load(&config_path)?;

    assert_eq!(config.window.title, "Colour Cycle");
    // Unspecified keys keep their defaults
    assert_eq!(config.window.app_id, "hello-wayland");
    assert_eq!(config.window.min_width, 1024);
    assert!(!config.window.server_side_decorations);
    assert_eq!(config.cursor.name, "left_ptr");
    assert_eq!(config.cursor.size, Some(32));
    assert_eq!(config.cursor.theme, None);
    assert_eq!(config.render.color_step, 3);

    Ok(())
}

#[test]
fn test_empty_file_yields_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "")?;

    assert_eq!(HelloConfig::load(&config_path)?, HelloConfig::default());
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let result = HelloConfig::load(temp_dir.path().join("absent.toml"));
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Failed to read config file"));
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[window\ntitle = ").unwrap();

    let message = format!("{:#}", HelloConfig::load(&config_path).unwrap_err());
    assert!(message.contains("Failed to parse config file"));
}

#[test]
fn test_invalid_values_fail_validation() {
    let mut config = HelloConfig::default();
    config.window.min_width = 0;
    assert!(config.validate().is_err());

    let mut config = HelloConfig::default();
    config.window.min_height = -5;
    assert!(config.validate().is_err());

    let mut config = HelloConfig::default();
    config.window.title = "   ".to_string();
    assert!(config.validate().is_err());

    let mut config = HelloConfig::default();
    config.cursor.size = Some(0);
    assert!(config.validate().is_err());

    let mut config = HelloConfig::default();
    config.cursor.size = Some(MAX_CURSOR_SIZE + 1);
    assert!(config.validate().is_err());

    let mut config = HelloConfig::default();
    config.render.color_step = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_file_is_rejected_on_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[render]\ncolor_step = 0\n").unwrap();
    assert!(HelloConfig::load(&config_path).is_err());
}

#[test]
fn test_save_then_load() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = HelloConfig::default();
    config.window.title = "Saved".to_string();
    config.save(&config_path)?;

    assert_eq!(HelloConfig::load(&config_path)?, config);
    Ok(())
}

#[test]
fn test_merge_partial_overrides_changed_sections() {
    let mut base = HelloConfig::default();
    base.cursor.size = Some(48);

    let mut partial = HelloConfig::default();
    partial.window.title = "Merged".to_string();

    let merged = base.merge_partial(partial);
    assert_eq!(merged.window.title, "Merged");
    // Untouched section in the partial keeps the base value
    assert_eq!(merged.cursor.size, Some(48));
}

#[test]
fn test_window_options_conversion() {
    let mut config = HelloConfig::default();
    config.window.min_width = 640;
    config.window.min_height = 480;
    config.cursor.theme = Some("breeze".to_string());

    let options = config.window_options();
    assert_eq!(options.min_size, Size::new(640, 480));
    assert_eq!(options.title, "Hello Wayland");
    assert_eq!(options.cursor_theme.as_deref(), Some("breeze"));
    assert_eq!(options.cursor_size, None);
}

#[test]
#[serial]
fn test_tilde_expands_to_home() -> Result<()> {
    let temp_dir = tempdir()?;
    let previous = std::env::var("HOME").ok();
    std::env::set_var("HOME", temp_dir.path());

    let config_dir = temp_dir.path().join(".config/hello-wayland");
    fs::create_dir_all(&config_dir)?;
    fs::write(config_dir.join("config.toml"), "[window]\ntitle = \"Home\"\n")?;

    let loaded = HelloConfig::load(DEFAULT_CONFIG_PATH);

    match previous {
        Some(home) => std::env::set_var("HOME", home),
        None => std::env::remove_var("HOME"),
    }
    assert_eq!(loaded?.window.title, "Home");
    Ok(())
}

#[test]
fn test_expand_home_leaves_other_paths_alone() -> Result<()> {
    let path = Path::new("/etc/hello-wayland.toml");
    assert_eq!(expand_home(path)?, path.to_path_buf());
    Ok(())
}
