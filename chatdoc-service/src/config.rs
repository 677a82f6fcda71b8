//! Service configuration.
//!
//! All tunables live here and are injected into components as structs;
//! nothing reads the environment after startup. Values come from an
//! optional `config` file merged with `CHATDOC__`-prefixed environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_remote")]
    pub remote: RemoteConfig,

    #[serde(default = "default_polling")]
    pub polling: PollingConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Remote processing service (RAG engine) configuration.
///
/// The timeout budgets are deliberately distinct: registration may ship a
/// large file, status polls must return quickly, and chat turns sit in
/// between.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    #[serde(default = "default_register_timeout_secs")]
    pub register_timeout_secs: u64,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,

    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

/// Question-readiness polling budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Delay between attempts of the bounded interactive poll.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// Attempts before the interactive poll gives up and reports
    /// "taking longer than expected".
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Re-arm delay for the background poll that keeps running after the
    /// interactive budget is exhausted.
    #[serde(default = "default_background_interval_secs")]
    pub background_interval_secs: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }
}

/// Size and history limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,

    /// Number of prior messages sent as context with each chat turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            remote: default_remote(),
            polling: default_polling(),
            limits: default_limits(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        default_remote()
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        default_polling()
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        default_limits()
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_remote() -> RemoteConfig {
    RemoteConfig {
        base_url: default_remote_url(),
        register_timeout_secs: default_register_timeout_secs(),
        poll_timeout_secs: default_poll_timeout_secs(),
        chat_timeout_secs: default_chat_timeout_secs(),
        extract_timeout_secs: default_extract_timeout_secs(),
    }
}

pub(crate) fn default_remote_url() -> String {
    "http://localhost:8001".to_string()
}

pub(crate) fn default_register_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_poll_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_chat_timeout_secs() -> u64 {
    60
}

pub(crate) fn default_extract_timeout_secs() -> u64 {
    90
}

pub(crate) fn default_polling() -> PollingConfig {
    PollingConfig {
        interval_ms: default_poll_interval_ms(),
        max_attempts: default_max_attempts(),
        background_interval_secs: default_background_interval_secs(),
    }
}

pub(crate) fn default_poll_interval_ms() -> u64 {
    2000
}

pub(crate) fn default_max_attempts() -> u32 {
    10
}

pub(crate) fn default_background_interval_secs() -> u64 {
    15
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_document_size_bytes: default_max_document_size(),
        history_window: default_history_window(),
    }
}

pub(crate) fn default_max_document_size() -> u64 {
    50 * 1024 * 1024
}

pub(crate) fn default_history_window() -> usize {
    10
}
