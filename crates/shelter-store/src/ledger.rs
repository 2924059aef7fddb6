//! Registry and ledger record types

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use shelter_util::ShelterId;

/// One immutable row of a shelter's occupancy ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Row ID, assigned by the store on append
    pub id: i64,

    /// Event time of the crossing
    pub timestamp: NaiveDateTime,

    pub shelter_id: ShelterId,

    /// 1 for an entry crossing, else 0
    pub people_in: u8,

    /// 1 for an exit crossing, else 0 (recorded even when the count was clamped)
    pub people_out: u8,

    /// Occupancy immediately after this row, never negative
    pub resulting_count: i64,
}

impl LedgerRecord {
    pub fn new(
        shelter_id: ShelterId,
        timestamp: NaiveDateTime,
        people_in: u8,
        people_out: u8,
        resulting_count: i64,
    ) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            shelter_id,
            people_in,
            people_out,
            resulting_count,
        }
    }

    /// Unclamped signed change this row represents
    pub fn delta(&self) -> i64 {
        i64::from(self.people_in) - i64::from(self.people_out)
    }
}

/// Registry row for a shelter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelterRecord {
    pub shelter_id: ShelterId,

    /// Lowercase hex SHA-256 of the shared secret
    pub credential_fingerprint: String,

    /// Denormalized copy of the last ledger row's `resulting_count`
    pub current_count: i64,

    /// Most recent event time seen for this shelter, counted or not
    pub last_activity: Option<NaiveDateTime>,
}

/// In/out sums over a set of ledger rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub people_in: i64,
    pub people_out: i64,
}

impl LedgerTotals {
    pub fn net(&self) -> i64 {
        self.people_in - self.people_out
    }
}

/// Totals for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTotals {
    pub day: NaiveDate,
    pub totals: LedgerTotals,
}
