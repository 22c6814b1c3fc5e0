//! Configuration management for the offline-sync replication engine.
//!
//! Loads hierarchically from, in ascending precedence:
//! 1. Built-in defaults
//! 2. `~/.config/offsyncd/config.toml` (user defaults)
//! 3. `offsync.toml` (project config, git-tracked)
//! 4. `offsync.local.toml` (gitignored local overrides)
//! 5. `OFFSYNC_*` environment variables (highest precedence)

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

use offsync_types::Mode;
use serde::{Deserialize, Serialize};

/// Top-level offline-sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsyncConfig {
    pub mode: Mode,
    #[serde(rename = "shipId")]
    pub ship_id: Option<String>,
    pub bus: BusConfig,
    pub sync: SyncConfig,
    #[serde(rename = "contentTypes")]
    pub content_types: Vec<String>,
    pub media: MediaConfig,
    pub http: HttpConfig,
}

impl Default for OffsyncConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Replica,
            ship_id: None,
            bus: BusConfig::default(),
            sync: SyncConfig::default(),
            content_types: Vec::new(),
            media: MediaConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl OffsyncConfig {
    /// Validates required fields per mode.
    ///
    /// A replica with no `shipId` or a bus with no brokers can never
    /// usefully connect, so this fails fast at bootstrap instead of
    /// letting the first connect attempt fail obscurely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == Mode::Replica && self.ship_id.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation(
                "replica mode requires a non-empty shipId".into(),
            ));
        }
        if self.bus.brokers.is_empty() {
            return Err(ConfigError::Validation(
                "bus.brokers must contain at least one broker address".into(),
            ));
        }
        if self.media.enabled {
            if self.media.master_store.endpoint.is_empty() {
                return Err(ConfigError::Validation(
                    "media.masterStore.endpoint is required when media is enabled".into(),
                ));
            }
            if self.media.local_store.endpoint.is_empty() {
                return Err(ConfigError::Validation(
                    "media.localStore.endpoint is required when media is enabled".into(),
                ));
            }
        }
        Ok(())
    }

    /// Whether content of the given type should be synced at all. An
    /// empty allow-list means "all types".
    pub fn content_type_allowed(&self, content_type: &str) -> bool {
        self.content_types.is_empty()
            || self.content_types.iter().any(|t| t == content_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub brokers: Vec<String>,
    pub tls: bool,
    pub auth: Option<BusAuthConfig>,
    pub topics: TopicsConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            tls: false,
            auth: None,
            topics: TopicsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    #[serde(rename = "masterUpdates")]
    pub master_updates: String,
    #[serde(rename = "shipUpdates")]
    pub ship_updates: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            master_updates: "master-updates".into(),
            ship_updates: "ship-updates".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(rename = "batchSize")]
    pub batch_size: usize,
    #[serde(rename = "retryAttempts")]
    pub retry_attempts: u32,
    #[serde(rename = "retryDelay")]
    pub retry_delay_ms: u64,
    #[serde(rename = "connectivityCheckInterval")]
    pub connectivity_check_interval_ms: u64,
    #[serde(rename = "debounceMs")]
    pub debounce_ms: u64,
    #[serde(rename = "autoPushInterval")]
    pub auto_push_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry_attempts: 3,
            retry_delay_ms: 5_000,
            connectivity_check_interval_ms: 30_000,
            debounce_ms: 1_000,
            auto_push_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub enabled: bool,
    #[serde(rename = "masterStore")]
    pub master_store: ObjectStoreConfig,
    #[serde(rename = "localStore")]
    pub local_store: ObjectStoreConfig,
    #[serde(rename = "transformUrls")]
    pub transform_urls: bool,
    #[serde(rename = "maxFilesPerSync")]
    pub max_files_per_sync: usize,
    #[serde(rename = "disableFullSync")]
    pub disable_full_sync: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            master_store: ObjectStoreConfig::default(),
            local_store: ObjectStoreConfig::default(),
            transform_urls: true,
            max_files_per_sync: 100,
            disable_full_sync: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "uploadPath")]
    pub upload_path: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".into(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            base_url: String::new(),
            upload_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    #[serde(rename = "bindAddress")]
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8090".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_without_ship_id_fails_validation() {
        let mut config = OffsyncConfig {
            mode: Mode::Replica,
            ..Default::default()
        };
        config.bus.brokers.push("localhost:9092".into());
        assert!(config.validate().is_err());

        config.ship_id = Some("ship-1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_allow_list_permits_everything() {
        let config = OffsyncConfig::default();
        assert!(config.content_type_allowed("api::article.article"));
    }

    #[test]
    fn non_empty_allow_list_restricts() {
        let mut config = OffsyncConfig::default();
        config.content_types.push("api::article.article".into());
        assert!(config.content_type_allowed("api::article.article"));
        assert!(!config.content_type_allowed("api::page.page"));
    }
}
