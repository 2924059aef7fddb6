//! Command types for the shelterd protocol

use serde::{Deserialize, Serialize};
use shelter_util::{ShelterError, ShelterId};

use crate::{
    API_VERSION, AggregateQuery, AggregateResult, HealthStatus, IngestOutcome,
    ReconcileReport, SensorReading, ShelterView,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    /// Build a response from an engine result
    pub fn from_result(
        request_id: u64,
        result: Result<ResponsePayload, ShelterError>,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(request_id, payload),
            Err(e) => Self::error(request_id, ErrorInfo::from(&e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// Whether resubmitting the identical request is safe and may succeed
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

impl From<&ShelterError> for ErrorInfo {
    fn from(e: &ShelterError) -> Self {
        let code = match e {
            ShelterError::NotFound(_) => ErrorCode::NotFound,
            ShelterError::Unauthorized(_) => ErrorCode::Unauthorized,
            ShelterError::InvalidState(_) => ErrorCode::InvalidState,
            ShelterError::Conflict(_) => ErrorCode::Conflict,
            ShelterError::Unavailable(_) => ErrorCode::Unavailable,
            ShelterError::Internal(_) => ErrorCode::InternalError,
        };
        ErrorInfo::new(code, e.to_string())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    Unauthorized,
    InvalidState,
    Conflict,
    Unavailable,
    PermissionDenied,
    InternalError,
}

impl ErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Conflict | ErrorCode::Unavailable)
    }
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Submit one sensor reading
    IngestEvent(SensorReading),

    /// Refresh a shelter's last activity without counting anything
    Heartbeat {
        shelter_id: ShelterId,
        timestamp: String,
        credential: String,
    },

    /// Aggregate read over a shelter's ledger
    Query(AggregateQuery),

    /// List registered shelters
    ListShelters,

    /// Rebuild a shelter's cached counter from its ledger (admin only)
    Reconcile { shelter_id: ShelterId },

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Ingested(IngestOutcome),
    HeartbeatRecorded,
    Aggregate(AggregateResult),
    Shelters { shelters: Vec<ShelterView> },
    Reconciled(ReconcileReport),
    Health(HealthStatus),
    Pong,
}
