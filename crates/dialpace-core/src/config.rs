//! Configuration management for dialpace
//!
//! Settings live in `dialpace.toml`. Every field has a default, so a missing file
//! or a partial one is valid. Secrets are never stored here: the provider API key
//! is read from the environment variable named by `provider.api_key_env`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{DialpaceError, Result};

/// Default config file name
pub const CONFIG_FILE: &str = "dialpace.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialpaceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub batch: BatchDefaults,
}

/// HTTP service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the webhook/control server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Externally reachable base URL; webhook URLs are derived from it
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

/// On-disk locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// File (under `data_dir`) receiving finalized call records
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,

    /// File (under `data_dir`) holding the daily cap snapshot
    #[serde(default = "default_caps_file")]
    pub caps_file: String,
}

/// Telephony provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Endpoint accepting call placement requests
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Number presented to the callee
    #[serde(default)]
    pub caller_id: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Defaults applied to batches that don't override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDefaults {
    #[serde(default = "default_daily_cap")]
    pub daily_cap: u32,

    #[serde(default = "default_min_delay_sec")]
    pub min_delay_sec: u64,

    #[serde(default = "default_max_delay_sec")]
    pub max_delay_sec: u64,

    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

// Default value providers
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_metrics_file() -> String {
    "call_metrics.jsonl".to_string()
}

fn default_caps_file() -> String {
    "daily_caps.json".to_string()
}

fn default_api_url() -> String {
    "https://api.voximplant.com/platform_api/StartScenarios".to_string()
}

fn default_api_key_env() -> String {
    "DIALPACE_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_daily_cap() -> u32 {
    3
}

fn default_min_delay_sec() -> u64 {
    20
}

fn default_max_delay_sec() -> u64 {
    90
}

fn default_repeat() -> u32 {
    1
}

impl DialpaceConfig {
    /// Load configuration from `path` or use defaults if it doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                DialpaceError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| DialpaceError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Full path of the daily cap snapshot
    pub fn caps_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.caps_file)
    }

    /// Webhook URL handed to the provider with every call
    pub fn event_url(&self) -> String {
        format!(
            "{}/webhooks/events",
            self.server.public_url.trim_end_matches('/')
        )
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: default_public_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            metrics_file: default_metrics_file(),
            caps_file: default_caps_file(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            caller_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            daily_cap: default_daily_cap(),
            min_delay_sec: default_min_delay_sec(),
            max_delay_sec: default_max_delay_sec(),
            repeat: default_repeat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DialpaceConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.batch.daily_cap, 3);
        assert_eq!(config.caps_path(), PathBuf::from("data/daily_caps.json"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "[server]\npublic_url = \"https://calls.example.com/\"\n\n[batch]\ndaily_cap = 1\n",
        )
        .unwrap();

        let config = DialpaceConfig::load_or_default(&path).unwrap();
        assert_eq!(config.batch.daily_cap, 1);
        assert_eq!(config.batch.max_delay_sec, 90);
        assert_eq!(
            config.event_url(),
            "https://calls.example.com/webhooks/events"
        );
    }

    #[test]
    fn test_write_default_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join(CONFIG_FILE);
        DialpaceConfig::write_default(&path).unwrap();

        let config = DialpaceConfig::load_or_default(&path).unwrap();
        assert_eq!(config.storage.caps_file, "daily_caps.json");
        assert_eq!(config.provider.api_key_env, "DIALPACE_API_KEY");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[batch\ndaily_cap = ").unwrap();

        assert!(matches!(
            DialpaceConfig::load_or_default(&path),
            Err(DialpaceError::Config(_))
        ));
    }
}
