use super::*;
use crate::config::settings::{
    ENV_ACCESS_TOKEN, ENV_API_KEY, ENV_APP_ID, ENV_DATABASE_ID, ENV_EMULATOR_HOST,
    ENV_PROJECT_ID, ENV_TIMEOUT_SECS,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn environment_overrides_defaults() {
    let mut config = FirebaseConfig::default();
    config
        .apply_env(lookup_from(&[
            (ENV_API_KEY, "key-123"),
            (ENV_PROJECT_ID, "demo-project"),
            (ENV_APP_ID, "1:42:web:abc"),
            (ENV_DATABASE_ID, "analytics"),
            (ENV_TIMEOUT_SECS, "12"),
        ]))
        .expect("env should apply");

    assert_eq!(config.api_key.as_deref(), Some("key-123"));
    assert_eq!(config.project_id.as_deref(), Some("demo-project"));
    assert_eq!(config.app_id.as_deref(), Some("1:42:web:abc"));
    assert_eq!(config.database_id, "analytics");
    assert_eq!(config.timeout_secs, 12);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_environment_values_are_ignored() {
    let mut config = FirebaseConfig {
        project_id: Some("from-file".to_string()),
        ..FirebaseConfig::default()
    };
    config
        .apply_env(lookup_from(&[(ENV_PROJECT_ID, ""), (ENV_ACCESS_TOKEN, "  ")]))
        .expect("env should apply");

    assert_eq!(config.project_id.as_deref(), Some("from-file"));
    assert!(config.access_token.is_none());
}

#[test]
fn unparsable_timeout_is_rejected() {
    let mut config = FirebaseConfig::default();
    let result = config.apply_env(lookup_from(&[(ENV_TIMEOUT_SECS, "soon")]));

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue {
            name: ENV_TIMEOUT_SECS,
            ..
        })
    ));
}

#[test]
fn config_file_is_loaded() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
            [firebase]
            project_id = "file-project"
            api_key = "file-key"
            emulator_host = "127.0.0.1:8080"
        "#,
    )
    .expect("should write config file");

    let config = Config::from_file(&config_path).expect("should load config file");

    assert_eq!(config.firebase.project_id.as_deref(), Some("file-project"));
    assert_eq!(config.firebase.api_key.as_deref(), Some("file-key"));
    assert_eq!(
        config.firebase.emulator_host.as_deref(),
        Some("127.0.0.1:8080")
    );
    assert_eq!(config.firebase.database_id, "(default)");
    assert_eq!(config.firebase.timeout_secs, 30);
}

#[test]
fn environment_wins_over_file() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[firebase]\nemulator_host = \"file:1\"\n")
        .expect("should write config file");

    let mut config = Config::from_file(&config_path).expect("should load config file");
    config
        .firebase
        .apply_env(lookup_from(&[(ENV_EMULATOR_HOST, "env:2")]))
        .expect("env should apply");

    assert_eq!(config.firebase.emulator_host.as_deref(), Some("env:2"));
}

#[test]
fn invalid_toml_handling() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[firebase\nproject_id = ").expect("should write config file");

    assert!(Config::from_file(&config_path).is_err());
    assert!(Config::from_file(&temp_dir.path().join("missing.toml")).is_err());
}
