//! Client configuration.
//!
//! Settings live in a JSON file under the platform config directory and can
//! be overridden from the environment (after `.env` has been loaded by the
//! binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::util::{is_http_url, normalize_text_option};

const CONFIG_FILE_NAME: &str = "client-config.json";
const STORE_FILE_NAME: &str = "objectives.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

pub const ENV_SERVER_URL: &str = "WAYMARK_SERVER_URL";
pub const ENV_TOKEN: &str = "WAYMARK_TOKEN";
pub const ENV_USER_ID: &str = "WAYMARK_USER_ID";
pub const ENV_STORE_PATH: &str = "WAYMARK_STORE_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Bearer token; normally supplied through the environment only
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            store_path: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            user_id: None,
            token: None,
        }
    }
}

/// Directory holding the config file and default store
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("waymark"))
}

pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

impl ClientConfig {
    /// Load from the default path (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Override fields from environment variables looked up through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = normalize_text_option(lookup(ENV_SERVER_URL)) {
            self.server_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_TOKEN)) {
            self.token = Some(token);
        }
        if let Some(user_id) = normalize_text_option(lookup(ENV_USER_ID)) {
            self.user_id = Some(user_id);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_STORE_PATH)) {
            self.store_path = Some(PathBuf::from(path));
        }
        self.normalize();
    }

    pub fn normalize(&mut self) {
        self.server_url = normalize_text_option(self.server_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.user_id = normalize_text_option(self.user_id.take());
        self.token = normalize_text_option(self.token.take());
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.probe_interval_secs == 0 {
            self.probe_interval_secs = DEFAULT_PROBE_INTERVAL_SECS;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.server_url {
            if !is_http_url(url) {
                return Err(Error::Config(format!(
                    "server_url must include http:// or https:// (got '{url}')"
                )));
            }
        }
        Ok(())
    }

    /// Store location: explicit path, else the platform data directory
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("waymark").join(STORE_FILE_NAME))
            .ok_or_else(|| Error::Config("could not resolve a data directory".to_string()))
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Session built from the configured credentials
    pub fn session(&self) -> Session {
        Session::new(
            self.token.clone().unwrap_or_default(),
            self.user_id.clone().unwrap_or_default(),
        )
    }
}
