//! Application configuration management.
//!
//! This module handles loading and saving the runner configuration: API and
//! observability proxy endpoints, feature switches, login for the token
//! source, and the tunables of the retry, refresh, cache and poll layers.
//!
//! Configuration is stored at `~/.config/dashsync/config.json`. Every field is
//! optional in the file; `DASHSYNC_*` environment variables override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::join_url;
use crate::api::retry::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_RETRIES};
use crate::api::RetryPolicy;
use crate::auth::manager::DEFAULT_REFRESH_COOLDOWN_SECS;
use crate::auth::Login;
use crate::cache::series::{DEFAULT_MAX_POINTS, DEFAULT_MAX_SERIES_KEYS};
use crate::obs::ObsProxy;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "dashsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_BASE: &str = "DASHSYNC_API_BASE";
pub const ENV_OBS_BASE: &str = "DASHSYNC_OBS_BASE";
pub const ENV_OBS_API_KEY: &str = "DASHSYNC_OBS_API_KEY";
pub const ENV_STREAM_URL: &str = "DASHSYNC_STREAM_URL";
pub const ENV_ENABLE_STREAMING: &str = "DASHSYNC_ENABLE_STREAMING";
pub const ENV_AUTO_AUTH: &str = "DASHSYNC_AUTO_AUTH";
pub const ENV_USERNAME: &str = "DASHSYNC_USERNAME";
pub const ENV_PASSWORD: &str = "DASHSYNC_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Observability proxy. When unset, Prometheus-backed metrics are read
    /// from the main API instead.
    pub obs_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub obs_api_key: Option<String>,
    /// Path (or absolute URL) of the credential-acquisition endpoint.
    pub auth_path: String,
    pub stream_url: Option<String>,
    pub enable_streaming: bool,
    /// Acquire a credential at start-up instead of waiting for the first 401.
    pub auto_credential_bootstrap: bool,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub refresh_cooldown_secs: u64,
    pub series_max_keys: usize,
    pub series_max_points: usize,
    pub poll_interval_ms: u64,
    pub auto_pause_on_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            obs_base_url: None,
            obs_api_key: None,
            auth_path: "/auth/token".to_string(),
            stream_url: None,
            enable_streaming: false,
            auto_credential_bootstrap: false,
            username: None,
            password: None,
            request_timeout_ms: 8_000,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            refresh_cooldown_secs: DEFAULT_REFRESH_COOLDOWN_SECS,
            series_max_keys: DEFAULT_MAX_SERIES_KEYS,
            series_max_points: DEFAULT_MAX_POINTS,
            poll_interval_ms: 5_000,
            auto_pause_on_hidden: true,
        }
    }
}

impl Config {
    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `DASHSYNC_*` overrides read through `lookup`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(base) = get(ENV_API_BASE) {
            self.api_base_url = base;
        }
        if let Some(base) = get(ENV_OBS_BASE) {
            self.obs_base_url = Some(base);
        }
        if let Some(key) = get(ENV_OBS_API_KEY) {
            self.obs_api_key = Some(key);
        }
        if let Some(url) = get(ENV_STREAM_URL) {
            self.stream_url = Some(url);
        }
        if let Some(flag) = get(ENV_ENABLE_STREAMING).and_then(|v| parse_flag(&v)) {
            self.enable_streaming = flag;
        }
        if let Some(flag) = get(ENV_AUTO_AUTH).and_then(|v| parse_flag(&v)) {
            self.auto_credential_bootstrap = flag;
        }
        if let Some(username) = get(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.password = Some(password);
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn auth_url(&self) -> String {
        join_url(&self.api_base_url, &self.auth_path)
    }

    pub fn login(&self) -> Option<Login> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Login {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// The proxy client, when a non-blank proxy base URL is configured.
    pub fn obs_proxy(&self) -> Option<ObsProxy> {
        self.obs_base_url
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .map(|base| ObsProxy::new(base, self.obs_api_key.clone()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_base_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.refresh_cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Streaming is only attempted when switched on and an endpoint is set.
    pub fn streaming_endpoint(&self) -> Option<&str> {
        if self.enable_streaming {
            self.stream_url.as_deref()
        } else {
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
