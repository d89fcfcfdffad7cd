//! Application configuration
//!
//! Defaults are overridden by an optional TOML file, then by environment
//! variables. The CLI applies its own flags last.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_BASE_URL: &str = "MARKETDATA_ADMIN_BASE_URL";
pub const ENV_TOKEN: &str = "MARKETDATA_ADMIN_TOKEN";
pub const ENV_DATA_DIR: &str = "MARKETDATA_ADMIN_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Refresh-task polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_polls: u32,
    pub max_consecutive_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_polls: 1800,
            max_consecutive_errors: 5,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub export_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub collections_ttl_secs: u64,
    pub default_page_size: u32,
    pub require_auth: bool,
    pub data_dir: Option<PathBuf>,
    /// Session token; normally read from the environment or the token store
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub poll: PollSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            export_timeout_secs: 300,
            upload_timeout_secs: 600,
            collections_ttl_secs: 300,
            default_page_size: 50,
            require_auth: true,
            data_dir: None,
            token: None,
            poll: PollSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `{data_dir}/config.toml`
    /// is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = default_data_dir().join(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.is_empty()) {
            self.token = Some(token);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))?;
        if self.poll.interval_ms == 0 {
            return Err(AppError::Config("poll.interval_ms must be positive".to_string()));
        }
        if self.poll.max_consecutive_errors == 0 {
            return Err(AppError::Config(
                "poll.max_consecutive_errors must be positive".to_string(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(AppError::Config("default_page_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Directory for the session token and the default config file
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn collections_ttl(&self) -> Duration {
        Duration::from_secs(self.collections_ttl_secs)
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".marketdata-admin"))
        .unwrap_or_else(|| PathBuf::from(".marketdata-admin"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = AppConfig::default();
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.poll.max_polls, 1800);
        assert_eq!(config.poll.max_consecutive_errors, 5);
        assert_eq!(config.collections_ttl(), Duration::from_secs(300));
        assert_eq!(config.export_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            base_url = "https://data.example.com"

            [poll]
            max_polls = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://data.example.com");
        assert_eq!(config.poll.max_polls, 60);
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = AppConfig::from_toml(r#"base_url = "http://file:8000""#).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://env:9000"),
            (ENV_TOKEN, "secret"),
            (ENV_DATA_DIR, ""),
        ]
        .into_iter()
        .collect();

        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://env:9000");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.poll.interval_ms = 0;
        assert!(config.validate().is_err());

        assert!(AppConfig::from_toml("base_url = 3").is_err());
    }
}
