//! Application configuration.
//!
//! Stored at `~/.config/attendance-portal/config.json`. The API URL can be
//! overridden with `ATTENDANCE_API_URL`, which the binaries may also pick
//! up from a `.env` file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::manager::DEFAULT_TTL_MS;
use crate::store::DEFAULT_QUOTA_BYTES;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "attendance-portal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that replaces `api_url`
pub const API_URL_ENV: &str = "ATTENDANCE_API_URL";

/// The local CORS proxy on its default port
const DEFAULT_API_URL: &str = "http://127.0.0.1:8787/";

const DEFAULT_SESSION_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub app_name: String,
    pub cache_ttl_ms: i64,
    pub session_timeout_ms: i64,
    pub storage_quota_bytes: usize,
    pub last_login_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_name: "Attendance Portal".to_string(),
            cache_ttl_ms: DEFAULT_TTL_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            last_login_id: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_login_id":"taro"}"#).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.cache_ttl_ms, 300_000);
        assert_eq!(config.session_timeout_ms, 86_400_000);
        assert_eq!(config.last_login_id.as_deref(), Some("taro"));
    }

    #[test]
    fn test_env_overrides_api_url() {
        let mut config = Config::default();
        config.apply_env(Some(" https://example.test/exec ".to_string()));
        assert_eq!(config.api_url, "https://example.test/exec");

        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.api_url, "https://example.test/exec");
    }
}
