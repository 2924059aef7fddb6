//! Protocol types for shelterd IPC
//!
//! This crate defines the stable API between shelterd and its clients
//! (sensor gateways, dashboards, `shelterctl`):
//! - Commands (requests from clients)
//! - Responses and error codes
//! - Sensor readings and aggregate result shapes
//! - Versioning

mod commands;
mod types;

pub use commands::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
