// src/config.rs
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::app_log;
use crate::environment::EnvironmentConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_MESSAGES_PATH: &str = "/api/messages";
const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Reconnection schedule for the real-time channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Delay before retry number `attempt`, with +/-12.5% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt).as_secs_f64();
        let jitter = (rand::random::<f64>() - 0.5) * capped * 0.25;
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        !self.enabled || (self.max_attempts != 0 && attempts > self.max_attempts)
    }
}

/// Settings for one synchronization context.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub messages_path: String,
    pub socket_path: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// `None` keeps typing flags until the next event for that peer.
    pub typing_ttl: Option<Duration>,
    pub typing_sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl SyncConfig {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            messages_path: DEFAULT_MESSAGES_PATH.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            typing_ttl: Some(Duration::from_secs(8)),
            typing_sweep_interval: Duration::from_secs(1),
        }
    }

    pub fn with_messages_path(mut self, path: &str) -> Self {
        self.messages_path = path.to_string();
        self
    }

    pub fn with_socket_path(mut self, path: &str) -> Self {
        self.socket_path = path.to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_typing_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.typing_ttl = ttl;
        self
    }

    pub fn with_typing_sweep_interval(mut self, interval: Duration) -> Self {
        self.typing_sweep_interval = interval;
        self
    }

    /// Base URL of the messages REST resource.
    pub fn messages_url(&self) -> String {
        crate::utils::join_url(&self.api_base_url, &self.messages_path)
    }

    /// Load from `config.yaml` (or `$PORTAL_CONFIG`) when present, then apply
    /// `$PORTAL_API_BASE_URL`.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PORTAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yaml"));

        let mut config = match EnvironmentConfig::load_from(&path)? {
            Some(env) => env.into_sync_config(),
            None => {
                app_log!(info, "No {} found, using defaults", path.display());
                Self::default()
            }
        };

        if let Ok(url) = std::env::var("PORTAL_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        app_log!(info, "Portal API: {}", config.api_base_url);
        Ok(config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
