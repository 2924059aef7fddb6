//! SQLite-based store implementation

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use shelter_util::{DAY_FORMAT, EVENT_TIME_FORMAT, ShelterId, format_day, format_event_time};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    DayTotals, LedgerRecord, LedgerTotals, ShelterRecord, Store, StoreError, StoreResult,
};

/// Busy timeout used when the caller does not pick one
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Raw ledger row as read from SQLite, before timestamp parsing
type RawLedgerRow = (i64, String, String, u8, u8, i64);

const LEDGER_COLUMNS: &str =
    "id, timestamp, shelter_id, people_in, people_out, resulting_count";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// `busy_timeout` bounds how long any statement waits on a locked
    /// database before failing with a retryable error.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Shelter registry
            CREATE TABLE IF NOT EXISTS shelters (
                shelter_id TEXT PRIMARY KEY,
                credential_fingerprint TEXT NOT NULL,
                current_count INTEGER NOT NULL DEFAULT 0 CHECK (current_count >= 0),
                last_activity TEXT
            );

            -- Occupancy ledger (append-only)
            CREATE TABLE IF NOT EXISTS ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                shelter_id TEXT NOT NULL REFERENCES shelters(shelter_id),
                people_in INTEGER NOT NULL CHECK (people_in IN (0, 1)),
                people_out INTEGER NOT NULL CHECK (people_out IN (0, 1)),
                resulting_count INTEGER NOT NULL CHECK (resulting_count >= 0)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_ledger_shelter_time ON ledger(shelter_id, timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_stored_time(s: &str) -> StoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, EVENT_TIME_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", s, e)))
}

fn parse_stored_day(s: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("day '{}': {}", s, e)))
}

fn ledger_from_raw(raw: RawLedgerRow) -> StoreResult<LedgerRecord> {
    let (id, timestamp, shelter_id, people_in, people_out, resulting_count) = raw;
    Ok(LedgerRecord {
        id,
        timestamp: parse_stored_time(&timestamp)?,
        shelter_id: ShelterId::new(shelter_id),
        people_in,
        people_out,
        resulting_count,
    })
}

fn ledger_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLedgerRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn shelter_from_raw(
    shelter_id: String,
    credential_fingerprint: String,
    current_count: i64,
    last_activity: Option<String>,
) -> StoreResult<ShelterRecord> {
    let last_activity = last_activity
        .as_deref()
        .map(parse_stored_time)
        .transpose()?;

    Ok(ShelterRecord {
        shelter_id: ShelterId::new(shelter_id),
        credential_fingerprint,
        current_count,
        last_activity,
    })
}

impl Store for SqliteStore {
    fn provision_shelter(&self, shelter_id: &ShelterId, fingerprint: &str) -> StoreResult<bool> {
        let conn = self.conn()?;

        let created = conn.execute(
            "INSERT OR IGNORE INTO shelters (shelter_id, credential_fingerprint) VALUES (?, ?)",
            params![shelter_id.as_str(), fingerprint],
        )? > 0;

        if !created {
            conn.execute(
                "UPDATE shelters SET credential_fingerprint = ? WHERE shelter_id = ?",
                params![fingerprint, shelter_id.as_str()],
            )?;
        }

        debug!(shelter_id = %shelter_id, created, "Shelter provisioned");
        Ok(created)
    }

    fn get_shelter(&self, shelter_id: &ShelterId) -> StoreResult<Option<ShelterRecord>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT shelter_id, credential_fingerprint, current_count, last_activity
                 FROM shelters WHERE shelter_id = ?",
                [shelter_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, fp, count, last)| shelter_from_raw(id, fp, count, last))
            .transpose()
    }

    fn list_shelters(&self) -> StoreResult<Vec<ShelterRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT shelter_id, credential_fingerprint, current_count, last_activity
             FROM shelters ORDER BY shelter_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut shelters = Vec::new();
        for row in rows {
            let (id, fp, count, last) = row?;
            shelters.push(shelter_from_raw(id, fp, count, last)?);
        }

        Ok(shelters)
    }

    fn touch_activity(&self, shelter_id: &ShelterId, at: NaiveDateTime) -> StoreResult<()> {
        let conn = self.conn()?;
        let at_str = format_event_time(&at);

        let updated = conn.execute(
            "UPDATE shelters SET last_activity = MAX(COALESCE(last_activity, ?1), ?1)
             WHERE shelter_id = ?2",
            params![at_str, shelter_id.as_str()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(shelter_id.to_string()));
        }

        debug!(shelter_id = %shelter_id, at = %at_str, "Activity touched");
        Ok(())
    }

    fn set_cached_count(&self, shelter_id: &ShelterId, count: i64) -> StoreResult<()> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE shelters SET current_count = ? WHERE shelter_id = ?",
            params![count, shelter_id.as_str()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(shelter_id.to_string()));
        }

        debug!(shelter_id = %shelter_id, count, "Cached count overwritten");
        Ok(())
    }

    fn commit_ledger(&self, record: &LedgerRecord) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let timestamp = format_event_time(&record.timestamp);

        // Dropping the transaction without commit rolls back both writes
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE shelters
             SET current_count = ?1,
                 last_activity = MAX(COALESCE(last_activity, ?2), ?2)
             WHERE shelter_id = ?3",
            params![record.resulting_count, timestamp, record.shelter_id.as_str()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(record.shelter_id.to_string()));
        }

        tx.execute(
            "INSERT INTO ledger (timestamp, shelter_id, people_in, people_out, resulting_count)
             VALUES (?, ?, ?, ?, ?)",
            params![
                timestamp,
                record.shelter_id.as_str(),
                record.people_in,
                record.people_out,
                record.resulting_count
            ],
        )?;

        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(
            ledger_id = id,
            shelter_id = %record.shelter_id,
            people_in = record.people_in,
            people_out = record.people_out,
            resulting_count = record.resulting_count,
            "Ledger row committed"
        );

        Ok(id)
    }

    fn last_ledger_record(&self, shelter_id: &ShelterId) -> StoreResult<Option<LedgerRecord>> {
        let conn = self.conn()?;

        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM ledger WHERE shelter_id = ?
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    LEDGER_COLUMNS
                ),
                [shelter_id.as_str()],
                ledger_row,
            )
            .optional()?;

        raw.map(ledger_from_raw).transpose()
    }

    fn ledger_records(&self, shelter_id: &ShelterId) -> StoreResult<Vec<LedgerRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ledger WHERE shelter_id = ? ORDER BY timestamp ASC, id ASC",
            LEDGER_COLUMNS
        ))?;

        let rows = stmt.query_map([shelter_id.as_str()], ledger_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(ledger_from_raw(row?)?);
        }

        Ok(records)
    }

    fn ledger_totals(
        &self,
        shelter_id: &ShelterId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<LedgerTotals> {
        let conn = self.conn()?;

        let (people_in, people_out) = conn.query_row(
            "SELECT COALESCE(SUM(people_in), 0), COALESCE(SUM(people_out), 0)
             FROM ledger
             WHERE shelter_id = ? AND date(timestamp) BETWEEN ? AND ?",
            params![shelter_id.as_str(), format_day(&start), format_day(&end)],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(LedgerTotals {
            people_in,
            people_out,
        })
    }

    fn daily_totals(
        &self,
        shelter_id: &ShelterId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DayTotals>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT date(timestamp) AS day, SUM(people_in), SUM(people_out)
             FROM ledger
             WHERE shelter_id = ? AND date(timestamp) BETWEEN ? AND ?
             GROUP BY day
             ORDER BY day",
        )?;

        let rows = stmt.query_map(
            params![shelter_id.as_str(), format_day(&start), format_day(&end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut days = Vec::new();
        for row in rows {
            let (day, people_in, people_out) = row?;
            days.push(DayTotals {
                day: parse_stored_day(&day)?,
                totals: LedgerTotals {
                    people_in,
                    people_out,
                },
            });
        }

        Ok(days)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelter_util::ShelterError;

    const FP: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, EVENT_TIME_FORMAT).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap()
    }

    fn provisioned() -> (SqliteStore, ShelterId) {
        let store = SqliteStore::in_memory().unwrap();
        let id = ShelterId::new("abc");
        store.provision_shelter(&id, FP).unwrap();
        (store, id)
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
        assert!(store.list_shelters().unwrap().is_empty());
    }

    #[test]
    fn test_provisioning_is_idempotent() {
        let (store, id) = provisioned();
        store
            .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
            .unwrap();

        // Re-provisioning refreshes the fingerprint but keeps the counter
        let created = store.provision_shelter(&id, &"0".repeat(64)).unwrap();
        assert!(!created);

        let shelter = store.get_shelter(&id).unwrap().unwrap();
        assert_eq!(shelter.credential_fingerprint, "0".repeat(64));
        assert_eq!(shelter.current_count, 1);
    }

    #[test]
    fn test_commit_updates_registry_and_ledger() {
        let (store, id) = provisioned();

        let row_id = store
            .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
            .unwrap();
        assert!(row_id > 0);

        let shelter = store.get_shelter(&id).unwrap().unwrap();
        assert_eq!(shelter.current_count, 1);
        assert_eq!(shelter.last_activity, Some(at("2024-01-01 08:00:00")));

        let records = store.ledger_records(&id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, row_id);
        assert_eq!(records[0].delta(), 1);
    }

    #[test]
    fn test_commit_unknown_shelter_writes_nothing() {
        let (store, _) = provisioned();
        let ghost = ShelterId::new("ghost");

        let err = store
            .commit_ledger(&LedgerRecord::new(ghost.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.ledger_records(&ghost).unwrap().is_empty());
    }

    #[test]
    fn test_failed_insert_rolls_back_registry_update() {
        let (store, id) = provisioned();
        store
            .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
            .unwrap();

        // people_in = 2 violates the ledger CHECK after the registry UPDATE ran
        let bad = LedgerRecord::new(id.clone(), at("2024-01-01 09:00:00"), 2, 0, 3);
        assert!(store.commit_ledger(&bad).is_err());

        let shelter = store.get_shelter(&id).unwrap().unwrap();
        assert_eq!(shelter.current_count, 1);
        assert_eq!(shelter.last_activity, Some(at("2024-01-01 08:00:00")));
        assert_eq!(store.ledger_records(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_constraint_failure_is_terminal() {
        let (store, id) = provisioned();

        let err = store
            .commit_ledger(&LedgerRecord::new(id, at("2024-01-01 08:00:00"), 2, 0, 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        let err: ShelterError = err.into();
        assert!(matches!(err, ShelterError::Internal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_poisoned_connection_is_terminal() {
        let store = SqliteStore::in_memory().unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.conn.lock().unwrap();
            panic!("poison the connection lock");
        }));

        let err = store.list_shelters().unwrap_err();
        assert!(matches!(err, StoreError::Poisoned));
        assert!(!ShelterError::from(err).is_retryable());
        assert!(!store.is_healthy());
    }

    #[test]
    fn test_busy_is_retryable() {
        let err: ShelterError = StoreError::Busy("database is locked".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_last_activity_never_moves_backward() {
        let (store, id) = provisioned();

        store.touch_activity(&id, at("2024-01-02 10:00:00")).unwrap();
        store.touch_activity(&id, at("2024-01-01 10:00:00")).unwrap();

        let shelter = store.get_shelter(&id).unwrap().unwrap();
        assert_eq!(shelter.last_activity, Some(at("2024-01-02 10:00:00")));

        let err = store
            .touch_activity(&ShelterId::new("ghost"), at("2024-01-01 10:00:00"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_records_ordered_by_event_time() {
        let (store, id) = provisioned();
        store
            .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 09:00:00"), 0, 1, 0))
            .unwrap();
        store
            .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
            .unwrap();

        let records = store.ledger_records(&id).unwrap();
        assert_eq!(records[0].timestamp, at("2024-01-01 08:00:00"));
        assert_eq!(records[1].timestamp, at("2024-01-01 09:00:00"));

        let last = store.last_ledger_record(&id).unwrap().unwrap();
        assert_eq!(last.timestamp, at("2024-01-01 09:00:00"));
    }

    #[test]
    fn test_range_totals() {
        let (store, id) = provisioned();
        let rows = [
            ("2024-01-01 08:00:00", 1, 0, 1),
            ("2024-01-01 09:00:00", 1, 0, 2),
            ("2024-01-03 10:00:00", 0, 1, 1),
            ("2024-01-05 23:59:59", 0, 1, 0),
        ];
        for (ts, i, o, c) in rows {
            store
                .commit_ledger(&LedgerRecord::new(id.clone(), at(ts), i, o, c))
                .unwrap();
        }

        let totals = store
            .ledger_totals(&id, day("2024-01-01"), day("2024-01-03"))
            .unwrap();
        assert_eq!(totals, LedgerTotals { people_in: 2, people_out: 1 });

        let empty = store
            .ledger_totals(&id, day("2024-02-01"), day("2024-02-07"))
            .unwrap();
        assert_eq!(empty, LedgerTotals::default());

        let by_day = store
            .daily_totals(&id, day("2024-01-01"), day("2024-01-05"))
            .unwrap();
        assert_eq!(by_day.len(), 3);
        assert_eq!(by_day[0].day, day("2024-01-01"));
        assert_eq!(by_day[0].totals.net(), 2);
        assert_eq!(by_day[2].day, day("2024-01-05"));
        assert_eq!(by_day[2].totals.net(), -1);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelterd.db");
        let id = ShelterId::new("abc");

        {
            let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            store.provision_shelter(&id, FP).unwrap();
            store
                .commit_ledger(&LedgerRecord::new(id.clone(), at("2024-01-01 08:00:00"), 1, 0, 1))
                .unwrap();
        }

        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(store.get_shelter(&id).unwrap().unwrap().current_count, 1);
        assert_eq!(store.ledger_records(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_set_cached_count() {
        let (store, id) = provisioned();
        store.set_cached_count(&id, 4).unwrap();
        assert_eq!(store.get_shelter(&id).unwrap().unwrap().current_count, 4);
        assert!(store.set_cached_count(&ShelterId::new("ghost"), 0).is_err());
    }
}
