//! Persistence layer for shelterd
//!
//! Provides:
//! - Shelter registry (identity, credential fingerprint, cached counter)
//! - Occupancy ledger (append-only)
//! - Range totals over the ledger for aggregate queries

mod ledger;
mod sqlite;
mod traits;

pub use ledger::*;
pub use sqlite::*;
pub use traits::*;

use shelter_util::{ShelterError, ShelterId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Database locked: {0}")]
    Locked(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &e {
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                ErrorCode::DatabaseBusy => StoreError::Busy(e.to_string()),
                ErrorCode::DatabaseLocked => StoreError::Locked(e.to_string()),
                ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen
                | ErrorCode::OutOfMemory => StoreError::Unavailable(e.to_string()),
                ErrorCode::ConstraintViolation => StoreError::Constraint(e.to_string()),
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    StoreError::Corrupt(e.to_string())
                }
                _ => StoreError::Database(e.to_string()),
            },
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Only busy, locked and I/O failures are retryable; everything else is terminal
impl From<StoreError> for ShelterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ShelterError::NotFound(ShelterId::new(id)),
            StoreError::Locked(msg) => ShelterError::Conflict(msg),
            StoreError::Busy(msg) | StoreError::Unavailable(msg) => ShelterError::Unavailable(msg),
            StoreError::Io(e) => ShelterError::Unavailable(e.to_string()),
            StoreError::Database(msg) | StoreError::Constraint(msg) | StoreError::Corrupt(msg) => {
                ShelterError::Internal(msg)
            }
            StoreError::Poisoned => ShelterError::internal("connection lock poisoned"),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
