// src/environment.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{ReconnectPolicy, SyncConfig};

/// One environment section of `config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub messages_path: Option<String>,
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub reconnect: Option<ReconnectPolicy>,
    /// 0 disables typing expiry.
    #[serde(default)]
    pub typing_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: EnvironmentConfig,
    production: EnvironmentConfig,
}

impl EnvironmentConfig {
    /// Load the section for the current environment, or `None` when the file
    /// does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content, &environment)
            .with_context(|| format!("Failed to parse {}", path.display()))
            .map(Some)
    }

    fn get_environment() -> String {
        std::env::var("PORTAL_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .unwrap_or_else(|_| "local".to_string())
    }

    fn parse(content: &str, environment: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        Ok(match environment {
            "production" => file.production,
            _ => file.local,
        })
    }

    pub fn into_sync_config(self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.api_base_url);

        if let Some(path) = self.messages_path {
            config = config.with_messages_path(&path);
        }
        if let Some(path) = self.socket_path {
            config = config.with_socket_path(&path);
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(policy) = self.reconnect {
            config = config.with_reconnect(policy);
        }
        match self.typing_ttl_secs {
            Some(0) => config.with_typing_ttl(None),
            Some(secs) => config.with_typing_ttl(Some(Duration::from_secs(secs))),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
local:
  api_base_url: http://localhost:5000
  typing_ttl_secs: 0
production:
  api_base_url: https://api.portal.example.com
  request_timeout_secs: 15
  reconnect:
    initial_backoff: 250
    max_backoff: 30000
    max_attempts: 10
"#;

    #[test]
    fn test_parse_local_section() {
        let config = EnvironmentConfig::parse(SAMPLE, "local")
            .unwrap()
            .into_sync_config();
        assert_eq!(config.api_base_url, "http://localhost:5000");
        assert!(config.typing_ttl.is_none());
        assert!(config.reconnect.enabled);
    }

    #[test]
    fn test_parse_production_section() {
        let config = EnvironmentConfig::parse(SAMPLE, "production")
            .unwrap()
            .into_sync_config();
        assert_eq!(config.api_base_url, "https://api.portal.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.reconnect.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_backoff, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.multiplier, 2.0);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let missing = Path::new("/definitely/not/here/config.yaml");
        assert!(EnvironmentConfig::load_from(missing).unwrap().is_none());
    }
}
