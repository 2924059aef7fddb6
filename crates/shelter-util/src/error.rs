//! Error types for shelterd

use thiserror::Error;

use crate::ShelterId;

/// Core error type for shelterd operations
#[derive(Debug, Error)]
pub enum ShelterError {
    #[error("Shelter not found: {0}")]
    NotFound(ShelterId),

    #[error("Credential rejected for shelter {0}")]
    Unauthorized(ShelterId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShelterError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller may resubmit the identical request.
    ///
    /// Retrying an ingest with the same event time is harmless: if the first
    /// attempt committed, the debounce gate suppresses the retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, ShelterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_failures_are_retryable() {
        let id = ShelterId::new("abc");
        assert!(!ShelterError::NotFound(id.clone()).is_retryable());
        assert!(!ShelterError::Unauthorized(id).is_retryable());
        assert!(!ShelterError::invalid_state("bad timestamp").is_retryable());
        assert!(!ShelterError::internal("corrupt row").is_retryable());
        assert!(ShelterError::conflict("locked").is_retryable());
        assert!(ShelterError::unavailable("busy").is_retryable());
    }
}
