use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const ENV_API_KEY: &str = "FIREBASE_API_KEY";
pub const ENV_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const ENV_AUTH_DOMAIN: &str = "FIREBASE_AUTH_DOMAIN";
pub const ENV_STORAGE_BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
pub const ENV_MESSAGING_SENDER_ID: &str = "FIREBASE_MESSAGING_SENDER_ID";
pub const ENV_APP_ID: &str = "FIREBASE_APP_ID";
pub const ENV_MEASUREMENT_ID: &str = "FIREBASE_MEASUREMENT_ID";
pub const ENV_DATABASE_ID: &str = "FIRESTORE_DATABASE_ID";
pub const ENV_EMULATOR_HOST: &str = "FIRESTORE_EMULATOR_HOST";
pub const ENV_ACCESS_TOKEN: &str = "FIRESTORE_ACCESS_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "FIRESTORE_TIMEOUT_SECS";

pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1/";
pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;
const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub firebase: FirebaseConfig,
}

/// Connection settings for the Firestore project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FirebaseConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub auth_domain: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
    pub database_id: String,
    /// `host:port` of a local Firestore emulator
    pub emulator_host: Option<String>,
    /// OAuth bearer token sent alongside the API key
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    MissingValue(&'static str),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid emulator host: {0}")]
    InvalidEmulatorHost(String),
    #[error("Configuration directory not found")]
    DirectoryError,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Default for FirebaseConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            auth_domain: None,
            storage_bucket: None,
            messaging_sender_id: None,
            app_id: None,
            measurement_id: None,
            database_id: DEFAULT_DATABASE_ID.to_string(),
            emulator_host: None,
            access_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".firestore-mcp"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file (explicit path, or the default location when it
    /// exists) and apply environment overrides on top.
    ///
    /// Missing credentials are not an error here; the store connector
    /// reports them when it is built.
    #[inline]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_file_path() {
                Ok(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config
            .firebase
            .apply_env(|name| std::env::var(name).ok())
            .context("Invalid environment configuration")?;

        Ok(config)
    }

    #[inline]
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

impl FirebaseConfig {
    /// Override fields from environment variables. Empty values are ignored.
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let optional_fields = [
            (ENV_API_KEY, &mut self.api_key),
            (ENV_PROJECT_ID, &mut self.project_id),
            (ENV_AUTH_DOMAIN, &mut self.auth_domain),
            (ENV_STORAGE_BUCKET, &mut self.storage_bucket),
            (ENV_MESSAGING_SENDER_ID, &mut self.messaging_sender_id),
            (ENV_APP_ID, &mut self.app_id),
            (ENV_MEASUREMENT_ID, &mut self.measurement_id),
            (ENV_EMULATOR_HOST, &mut self.emulator_host),
            (ENV_ACCESS_TOKEN, &mut self.access_token),
        ];
        for (name, field) in optional_fields {
            if let Some(value) = get(name) {
                *field = Some(value);
            }
        }

        if let Some(database_id) = get(ENV_DATABASE_ID) {
            self.database_id = database_id;
        }

        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            self.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
        }

        Ok(())
    }

    /// Check that the store can be reached with these settings
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.project_id()?;
        self.api_key()?;

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if self.database_id.trim().is_empty() || self.database_id.contains('/') {
            return Err(ConfigError::InvalidValue {
                name: ENV_DATABASE_ID,
                value: self.database_id.clone(),
            });
        }

        self.endpoint()?;
        Ok(())
    }

    #[inline]
    pub fn project_id(&self) -> Result<&str, ConfigError> {
        required(self.project_id.as_deref(), ENV_PROJECT_ID)
    }

    #[inline]
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        required(self.api_key.as_deref(), ENV_API_KEY)
    }

    /// REST API root, pointing at the emulator when one is configured
    #[inline]
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        match &self.emulator_host {
            Some(host) => {
                let host = host.trim().trim_end_matches('/');
                if host.is_empty() || host.contains('/') {
                    return Err(ConfigError::InvalidEmulatorHost(host.to_string()));
                }
                Url::parse(&format!("http://{}/v1/", host))
                    .map_err(|_| ConfigError::InvalidEmulatorHost(host.to_string()))
            }
            None => Url::parse(DEFAULT_ENDPOINT)
                .map_err(|_| ConfigError::InvalidEmulatorHost(DEFAULT_ENDPOINT.to_string())),
        }
    }

    /// Copy with secrets masked, for display
    #[inline]
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| REDACTED.to_string());
        Self {
            api_key: mask(&self.api_key),
            access_token: mask(&self.access_token),
            ..self.clone()
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingValue(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = FirebaseConfig::default();
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.api_key.is_none());
        assert!(config.project_id.is_none());
    }

    #[test]
    fn required_values_are_checked() {
        let mut config = FirebaseConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingValue(ENV_PROJECT_ID))
        ));

        config.project_id = Some("demo".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingValue(ENV_API_KEY))
        ));

        config.api_key = Some("   ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingValue(ENV_API_KEY))
        ));

        config.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn timeout_bounds() {
        let mut config = FirebaseConfig {
            project_id: Some("demo".to_string()),
            api_key: Some("key".to_string()),
            ..FirebaseConfig::default()
        };

        config.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(0))));

        config.timeout_secs = 601;
        assert!(config.validate().is_err());

        config.timeout_secs = 600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoint_selection() {
        let mut config = FirebaseConfig::default();
        assert_eq!(
            config.endpoint().expect("default endpoint").as_str(),
            DEFAULT_ENDPOINT
        );

        config.emulator_host = Some("localhost:8080".to_string());
        assert_eq!(
            config.endpoint().expect("emulator endpoint").as_str(),
            "http://localhost:8080/v1/"
        );

        config.emulator_host = Some("localhost:8080/extra".to_string());
        assert!(matches!(
            config.endpoint(),
            Err(ConfigError::InvalidEmulatorHost(_))
        ));
    }

    #[test]
    fn redaction_masks_secrets_only() {
        let config = FirebaseConfig {
            api_key: Some("secret-key".to_string()),
            project_id: Some("demo".to_string()),
            access_token: Some("token".to_string()),
            ..FirebaseConfig::default()
        };

        let redacted = config.redacted();
        assert_eq!(redacted.api_key.as_deref(), Some(REDACTED));
        assert_eq!(redacted.access_token.as_deref(), Some(REDACTED));
        assert_eq!(redacted.project_id.as_deref(), Some("demo"));
    }
}
