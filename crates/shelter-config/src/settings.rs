//! Validated settings structures

use crate::schema::{RawConfig, RawServiceConfig, RawShelter};
use crate::validation::parse_fingerprint;
use shelter_util::{ShelterId, data_dir_without_env, socket_path_without_env};
use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// Default database busy timeout
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub counting: CountingConfig,
    pub store: StoreConfig,
    /// Shelters to provision at startup
    pub shelters: Vec<ShelterSeed>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let counting = CountingConfig {
            debounce_window: raw
                .counting
                .debounce_window_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DEBOUNCE_WINDOW),
        };

        let store = StoreConfig {
            busy_timeout: raw
                .store
                .busy_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BUSY_TIMEOUT),
        };

        Self {
            service: ServiceConfig::from_raw(raw.service),
            counting,
            store,
            shelters: raw.shelters.into_iter().map(ShelterSeed::from_raw).collect(),
        }
    }

    /// Get a provisioned shelter by ID
    pub fn get_shelter(&self, id: &ShelterId) -> Option<&ShelterSeed> {
        self.shelters.iter().find(|s| &s.id == id)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(socket_path_without_env),
            data_dir: raw.data_dir.unwrap_or_else(data_dir_without_env),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: socket_path_without_env(),
            data_dir: data_dir_without_env(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountingConfig {
    pub debounce_window: Duration,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// A shelter to provision: identity plus credential fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelterSeed {
    pub id: ShelterId,
    /// Lowercase hex SHA-256 of the shared secret
    pub credential_fingerprint: String,
}

impl ShelterSeed {
    fn from_raw(raw: RawShelter) -> Self {
        // Validation already rejected malformed fingerprints
        let credential_fingerprint = parse_fingerprint(&raw.credential_sha256)
            .unwrap_or_else(|_| raw.credential_sha256.trim().to_ascii_lowercase());

        Self {
            id: ShelterId::new(raw.id.trim()),
            credential_fingerprint,
        }
    }
}
