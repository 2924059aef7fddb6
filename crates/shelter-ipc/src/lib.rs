//! IPC layer for shelterd
//!
//! Sensor gateways and operators reach the daemon over a Unix socket that
//! carries one JSON request per line and one JSON response per line.
//! Connections are tagged with a role derived from the peer UID.

mod client;
mod server;

pub use client::*;
pub use server::*;

use shelter_api::ErrorInfo;
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server not started")]
    NotStarted,

    /// The daemon answered with an error
    #[error("{:?}: {}", .0.code, .0.message)]
    Rejected(ErrorInfo),

    /// The daemon answered, but not with what the request asks for
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl IpcError {
    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            IpcError::Rejected(info) => info.retryable,
            _ => false,
        }
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
