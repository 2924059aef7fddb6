//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Debounce and counting settings
    #[serde(default)]
    pub counting: RawCountingConfig,

    /// Database settings
    #[serde(default)]
    pub store: RawStoreConfig,

    /// Shelters provisioned at startup
    #[serde(default)]
    pub shelters: Vec<RawShelter>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the database
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCountingConfig {
    /// Window during which repeated triggers are treated as one crossing
    pub debounce_window_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStoreConfig {
    /// Upper bound on any wait for the database lock
    pub busy_timeout_ms: Option<u64>,
}

/// Raw shelter definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawShelter {
    /// Unique stable ID
    pub id: String,

    /// Hex SHA-256 of the shelter's shared secret
    pub credential_sha256: String,
}
