//! Configuration for the editor session and its service client

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding [`EditorConfig::base_url`]
pub const BASE_URL_ENV: &str = "WORKFLOW_EDITOR_BASE_URL";
/// Environment variable overriding [`EditorConfig::api_key`]
pub const API_KEY_ENV: &str = "WORKFLOW_EDITOR_API_KEY";

/// Default configuration values
pub mod defaults {
    pub const BASE_URL: &str = "http://127.0.0.1:8080";
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const MAX_UNDO_SNAPSHOTS: usize = 100;
    pub const WORKFLOW_NAME: &str = "Unnamed workflow";
}

/// Editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Root URL of the workflow service, without trailing slash
    pub base_url: String,
    /// Sent as `x-api-key` when present
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub max_undo_snapshots: usize,
    /// Name given to a new, never saved workflow
    pub workflow_name: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_undo_snapshots: defaults::MAX_UNDO_SNAPSHOTS,
            workflow_name: defaults::WORKFLOW_NAME.to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file and apply environment overrides
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&json)?;
        config.apply_env_overrides();
        log::info!("Loaded editor config from {}", path.display());
        Ok(config)
    }

    /// Apply `WORKFLOW_EDITOR_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            log::debug!("Using base url from {}", BASE_URL_ENV);
            self.base_url = base_url;
        }
        if let Some(api_key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = Some(api_key);
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
