//! Occupancy engine for shelterd
//!
//! This crate is the heart of shelterd, containing:
//! - Credential check (SHA-256 fingerprint of a per-shelter secret)
//! - Debounce gate (per-shelter, per-sensor bounce suppression)
//! - Ledger commits (clamped running count, one transaction per crossing)
//! - Aggregates over the ledger (current, daily, weekly by day, interval)
//! - Reconciliation of the cached counter against the ledger

mod aggregate;
mod credential;
mod engine;
mod gate;

pub use aggregate::*;
pub use credential::*;
pub use engine::*;
pub use gate::*;
