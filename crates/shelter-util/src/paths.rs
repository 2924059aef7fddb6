//! Default paths for shelterd components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/shelterd/shelterd.sock` or `/tmp/shelterd-$USER/shelterd.sock`
//! - Data: `$XDG_DATA_HOME/shelterd` or `~/.local/share/shelterd`
//! - Config: `$XDG_CONFIG_HOME/shelterd/config.toml` or `~/.config/shelterd/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const SHELTER_SOCKET_ENV: &str = "SHELTER_SOCKET";

/// Environment variable for overriding the data directory
pub const SHELTER_DATA_DIR_ENV: &str = "SHELTER_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "shelterd.sock";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "shelterd.db";

/// Application subdirectory name
const APP_DIR: &str = "shelterd";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$SHELTER_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/shelterd/shelterd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/shelterd-$USER/shelterd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SHELTER_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking SHELTER_SOCKET.
/// Used for config defaults where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$SHELTER_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/shelterd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/shelterd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SHELTER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking SHELTER_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}
