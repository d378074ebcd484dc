//! Client configuration
//!
//! Resolution order: built-in defaults, then `<config dir>/pdfstamp/config.json`,
//! then the `PDFSTAMP_API_URL` environment variable. The CLI flag overrides all.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default storage service endpoint
pub const DEFAULT_API_URL: &str = "http://localhost:8081/api/files";
/// Environment override for the endpoint
pub const API_URL_ENV: &str = "PDFSTAMP_API_URL";
/// Per-probe timeout for the connection test
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;

const APP_DIR: &str = "pdfstamp";
const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StamperConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for StamperConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl StamperConfig {
    /// Load from the user config file (if any) plus environment override
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        if let Ok(url) = std::env::var(API_URL_ENV) {
            debug!(url = %url, "API URL from environment");
            config.api_url = url;
        }
        config.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Reading config file");
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validated()
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Result<Self, ConfigError> {
        self.api_url = api_url.into();
        self.validated()
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        let url = self.api_url.trim().trim_end_matches('/').to_string();
        let has_host = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ConfigError::InvalidUrl(self.api_url));
        }
        self.api_url = url;
        Ok(self)
    }
}

/// `<config dir>/pdfstamp/config.json`, if the platform has a config dir
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR).join(CONFIG_FILE))
}
