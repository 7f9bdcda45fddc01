//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use skillcred_core::LifecycleConfig;

/// Full configuration for the Skillcred node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillcredConfig {
    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local index store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ledger client settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Timeouts and reconciliation timing.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// In-process ledger; credentials are lost on restart.
    Memory,
    /// JSON ledger gateway at `endpoint`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_backend")]
    pub backend: LedgerBackend,
    /// Gateway base URL, required for the `http` backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Address this node signs ledger writes as.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Issuers the `memory` backend accepts writes from.
    #[serde(default = "default_authorized_issuers")]
    pub authorized_issuers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    9101
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::Rocksdb
}
fn default_ledger_backend() -> LedgerBackend {
    LedgerBackend::Memory
}
fn default_issuer() -> String {
    "0xskillcred-issuer".into()
}
fn default_authorized_issuers() -> Vec<String> {
    vec![default_issuer()]
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: default_storage_backend(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: default_ledger_backend(),
            endpoint: None,
            issuer: default_issuer(),
            authorized_issuers: default_authorized_issuers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SkillcredConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: SkillcredConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }

    /// Backend combinations that lose data across restarts.
    ///
    /// A persistent mirror over the in-process ledger outlives the ledger
    /// it mirrors; after a restart the sweeper orphans every row.
    pub fn backend_warning(&self) -> Option<&'static str> {
        match (self.storage.backend, self.ledger.backend) {
            (StorageBackend::Rocksdb, LedgerBackend::Memory) => Some(
                "persistent index over the in-memory ledger: mirrored credentials \
                 will be orphaned after a restart; use ledger.backend = \"http\" \
                 or storage.backend = \"memory\"",
            ),
            _ => None,
        }
    }
}
