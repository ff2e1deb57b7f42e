use super::*;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = ServerConfig::default();
    assert_eq!(config.name, "mcp-tool-server");
    assert_eq!(config.version, "0.1.0");
    assert_eq!(config.allowed_paths, None);
    assert!(config.enable_file_tools);
    assert!(config.enable_shell_tools);
    assert!(config.enable_search_tools);
    assert_eq!(config.max_concurrent_requests, 10);
    assert!((config.request_timeout - 60.0).abs() < f64::EPSILON);
    assert_eq!(config.request_timeout_duration(), Duration::from_secs(60));
}

#[test]
fn config_validation() {
    let config = ServerConfig::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.name = "  ".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidName(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.max_concurrent_requests = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidConcurrency(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.request_timeout = 0.0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.request_timeout = f64::NAN;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn fractional_timeout_is_honoured() {
    let config = ServerConfig {
        request_timeout: 0.25,
        ..ServerConfig::default()
    };
    assert_eq!(config.request_timeout_duration(), Duration::from_millis(250));
}

#[test]
fn partial_config_with_defaults() {
    let partial_toml = r#"
        name = "custom"
        request_timeout = 5.5
    "#;

    let config: ServerConfig = toml::from_str(partial_toml).expect("should parse toml correctly");
    assert_eq!(config.name, "custom");
    assert!((config.request_timeout - 5.5).abs() < f64::EPSILON);
    assert_eq!(config.version, "0.1.0");
    assert_eq!(config.max_concurrent_requests, 10);
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        name = "unterminated
        max_concurrent_requests = "many"
    "#;

    let result: Result<ServerConfig, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let original_config = ServerConfig {
        name: "persisted".to_string(),
        allowed_paths: Some(vec![PathBuf::from("/srv/data")]),
        enable_shell_tools: false,
        max_concurrent_requests: 3,
        ..ServerConfig::default()
    };

    original_config
        .save_to(&config_path)
        .expect("should save config successfully");
    let loaded_config =
        ServerConfig::load(Some(&config_path)).expect("should load config successfully");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn load_missing_config() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let missing = temp_dir.path().join("absent.toml");

    let config = ServerConfig::load(Some(&missing)).expect("should load config successfully");
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "max_concurrent_requests = 0\n")
        .expect("should write to config_path successfully");

    let result = ServerConfig::load(Some(&config_path));
    assert!(result.is_err());
}

#[test]
fn family_flags() {
    let config = ServerConfig {
        enable_search_tools: false,
        ..ServerConfig::default()
    };

    assert!(config.is_enabled(ToolFamily::File));
    assert!(config.is_enabled(ToolFamily::Shell));
    assert!(!config.is_enabled(ToolFamily::Search));
}

#[test]
fn summary_hides_operational_settings() {
    let summary = ServerConfig::default().to_summary();
    let keys: Vec<&str> = summary
        .as_object()
        .expect("summary is an object")
        .keys()
        .map(String::as_str)
        .collect();

    assert_eq!(
        keys,
        vec![
            "enable_file_tools",
            "enable_search_tools",
            "enable_shell_tools",
            "name",
            "version"
        ]
    );
}
