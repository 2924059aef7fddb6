//! Shared utilities for shelterd
//!
//! This crate provides:
//! - ID types (ShelterId, ClientId)
//! - The error taxonomy shared by the engine and the protocol
//! - Time utilities (event timestamp parsing, calendar date ranges)
//! - Default paths for socket, data, and config

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
