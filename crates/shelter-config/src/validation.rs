//! Configuration validation

use crate::schema::{RawConfig, RawShelter};
use std::collections::HashSet;
use thiserror::Error;

/// Largest accepted debounce window
pub const MAX_DEBOUNCE_WINDOW_SECONDS: u64 = 3600;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Shelter '{shelter_id}': {message}")]
    ShelterError { shelter_id: String, message: String },

    #[error("Duplicate shelter ID: {0}")]
    DuplicateShelterId(String),

    #[error("Debounce window must be 1..={max} seconds, got {value}")]
    InvalidDebounceWindow { value: u64, max: u64 },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_ids = HashSet::new();
    for shelter in &config.shelters {
        if !seen_ids.insert(&shelter.id) {
            errors.push(ValidationError::DuplicateShelterId(shelter.id.clone()));
        }
    }

    for shelter in &config.shelters {
        errors.extend(validate_shelter(shelter));
    }

    if let Some(window) = config.counting.debounce_window_seconds
        && (window == 0 || window > MAX_DEBOUNCE_WINDOW_SECONDS)
    {
        errors.push(ValidationError::InvalidDebounceWindow {
            value: window,
            max: MAX_DEBOUNCE_WINDOW_SECONDS,
        });
    }

    if config.store.busy_timeout_ms == Some(0) {
        errors.push(ValidationError::GlobalError(
            "store.busy_timeout_ms must be greater than 0".into(),
        ));
    }

    errors
}

fn validate_shelter(shelter: &RawShelter) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if shelter.id.trim().is_empty() {
        errors.push(ValidationError::ShelterError {
            shelter_id: shelter.id.clone(),
            message: "id cannot be empty".into(),
        });
    }

    if let Err(message) = parse_fingerprint(&shelter.credential_sha256) {
        errors.push(ValidationError::ShelterError {
            shelter_id: shelter.id.clone(),
            message,
        });
    }

    errors
}

/// Normalize a hex SHA-256 fingerprint to lowercase
pub fn parse_fingerprint(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.len() != 64 {
        return Err(format!(
            "credential_sha256 must be 64 hex characters, got {}",
            s.len()
        ));
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("credential_sha256 must contain only hex digits".into());
    }
    Ok(s.to_ascii_lowercase())
}
