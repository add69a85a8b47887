use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_types::{ProviderConfig, ProviderId};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "default_photo_endpoints")]
    pub photo_endpoints: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            user_id: None,
            photo_endpoints: default_photo_endpoints(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_photo_endpoints() -> Vec<String> {
    vec!["/photos".to_string(), "/glass-photos".to_string()]
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub max_length: usize,
    pub cache_capacity: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_length: 150,
            cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub debounce_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "notes.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    pub active_provider: ProviderId,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// The configured provider matching `active_provider`, if it is enabled.
    pub fn active_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|provider| provider.id == self.active_provider && provider.enabled)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            active_provider: ProviderId::Anthropic,
            providers: default_providers(),
            backend: BackendConfig::default(),
            summary: SummaryConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: ProviderId::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            extra_headers: Vec::new(),
            enabled: true,
        },
        ProviderConfig {
            id: ProviderId::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            default_model: "gpt-4.1-mini".to_string(),
            extra_headers: Vec::new(),
            enabled: true,
        },
        ProviderConfig {
            id: ProviderId::Gemini,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
            extra_headers: Vec::new(),
            enabled: true,
        },
    ]
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        self.migrate(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        if config.providers.is_empty() {
            config.providers = default_providers();
        }
        if config.backend.photo_endpoints.is_empty() {
            config.backend.photo_endpoints = default_photo_endpoints();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn creates_default_config_when_missing() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        let config = store.load_or_init().expect("load default");
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.providers.len(), 3);
        assert!(store.path().exists());
        assert_eq!(
            config.active_provider_config().map(|p| p.id),
            Some(ProviderId::Anthropic)
        );
    }

    #[test]
    fn migrates_old_schema_and_fills_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"schema_version":0,"active_provider":"open_ai","backend":{"base_url":"http://pi:3001","photo_endpoints":[]}}"#,
        )
        .expect("write old config");

        let config = store.load_or_init().expect("migrate");
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.backend.base_url, "http://pi:3001");
        assert_eq!(config.backend.photo_endpoints.len(), 2);
        assert_eq!(config.backend.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.summary.max_length, 150);
    }

    #[test]
    fn config_lives_under_the_given_dir() {
        let data_dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(data_dir.path().join("config"));
        assert_eq!(store.path(), data_dir.path().join("config").join("config.json"));

        store.load_or_init().expect("init nested dir");
        assert!(data_dir.path().join("config/config.json").is_file());
    }
}
