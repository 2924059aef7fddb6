//! Store trait definitions

use chrono::{NaiveDate, NaiveDateTime};
use shelter_util::ShelterId;

use crate::{DayTotals, LedgerRecord, LedgerTotals, ShelterRecord, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Shelter registry

    /// Register a shelter, or refresh the fingerprint of an existing one.
    /// Returns true if the shelter was newly created.
    fn provision_shelter(&self, shelter_id: &ShelterId, fingerprint: &str) -> StoreResult<bool>;

    /// Get a shelter's registry row
    fn get_shelter(&self, shelter_id: &ShelterId) -> StoreResult<Option<ShelterRecord>>;

    /// List every registered shelter
    fn list_shelters(&self) -> StoreResult<Vec<ShelterRecord>>;

    /// Move `last_activity` forward to `at` (never backward)
    fn touch_activity(&self, shelter_id: &ShelterId, at: NaiveDateTime) -> StoreResult<()>;

    /// Overwrite the cached counter (reconciliation only)
    fn set_cached_count(&self, shelter_id: &ShelterId, count: i64) -> StoreResult<()>;

    // Ledger

    /// Append a ledger row and write its `resulting_count` and timestamp back
    /// to the registry, as one transaction. Returns the new row ID.
    fn commit_ledger(&self, record: &LedgerRecord) -> StoreResult<i64>;

    /// Latest ledger row for a shelter, by event time
    fn last_ledger_record(&self, shelter_id: &ShelterId) -> StoreResult<Option<LedgerRecord>>;

    /// Every ledger row for a shelter, ordered by event time then append order
    fn ledger_records(&self, shelter_id: &ShelterId) -> StoreResult<Vec<LedgerRecord>>;

    /// In/out sums over rows whose date falls in `start..=end`
    fn ledger_totals(
        &self,
        shelter_id: &ShelterId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<LedgerTotals>;

    /// Per-day in/out sums over `start..=end`; days without rows are omitted
    fn daily_totals(
        &self,
        shelter_id: &ShelterId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DayTotals>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
