//! Read-side aggregates over a shelter's ledger

use chrono::NaiveDate;
use shelter_api::{DailyCount, DayCount, IntervalCount, WeeklyCount};
use shelter_store::{LedgerRecord, ShelterRecord, Store};
use shelter_util::{DateRange, Result, ShelterId, format_day};
use std::collections::HashMap;

/// Running count obtained by replaying ledger rows in order, clamping at zero
/// after each row.
pub fn replay(records: &[LedgerRecord]) -> i64 {
    records
        .iter()
        .fold(0, |count, record| (count + record.delta()).max(0))
}

/// Net crossings on one calendar day, clamped at zero
pub fn daily_count(
    store: &dyn Store,
    shelter_id: &ShelterId,
    day: NaiveDate,
) -> Result<DailyCount> {
    let totals = store.ledger_totals(shelter_id, day, day)?;

    Ok(DailyCount {
        daily_count: totals.net().max(0),
        day: format_day(&day),
    })
}

/// One entry per date in `range`, days without rows reported as zero
pub fn weekly_by_day(
    store: &dyn Store,
    shelter: &ShelterRecord,
    range: DateRange,
) -> Result<WeeklyCount> {
    let by_day: HashMap<NaiveDate, i64> = store
        .daily_totals(&shelter.shelter_id, range.start, range.end)?
        .into_iter()
        .map(|d| (d.day, d.totals.net()))
        .collect();

    let weekly_data = range
        .days()
        .map(|day| DayCount {
            date: format_day(&day),
            count: by_day.get(&day).copied().unwrap_or(0).max(0),
        })
        .collect();

    Ok(WeeklyCount {
        weekly_data,
        current_count: shelter.current_count,
        start_date: format_day(&range.start),
        end_date: format_day(&range.end),
    })
}

/// Raw in/out totals over `range`, not netted or clamped
pub fn interval_count(
    store: &dyn Store,
    shelter_id: &ShelterId,
    range: DateRange,
) -> Result<IntervalCount> {
    let totals = store.ledger_totals(shelter_id, range.start, range.end)?;

    Ok(IntervalCount {
        people_in: totals.people_in,
        people_out: totals.people_out,
        start_date: format_day(&range.start),
        end_date: format_day(&range.end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use shelter_store::SqliteStore;
    use shelter_util::{DAY_FORMAT, EVENT_TIME_FORMAT};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap()
    }

    fn row(ts: &str, people_in: u8, people_out: u8, count: i64) -> LedgerRecord {
        LedgerRecord::new(
            ShelterId::new("S1"),
            NaiveDateTime::parse_from_str(ts, EVENT_TIME_FORMAT).unwrap(),
            people_in,
            people_out,
            count,
        )
    }

    fn seeded_store() -> (SqliteStore, ShelterRecord) {
        let store = SqliteStore::in_memory().unwrap();
        let id = ShelterId::new("S1");
        store.provision_shelter(&id, &"0".repeat(64)).unwrap();

        for record in [
            row("2024-03-01 08:00:00", 1, 0, 1),
            row("2024-03-01 09:00:00", 1, 0, 2),
            row("2024-03-01 10:00:00", 0, 1, 1),
            row("2024-03-03 08:00:00", 0, 1, 0),
            row("2024-03-03 09:00:00", 0, 1, 0),
        ] {
            store.commit_ledger(&record).unwrap();
        }

        let shelter = store.get_shelter(&id).unwrap().unwrap();
        (store, shelter)
    }

    #[test]
    fn test_replay_clamps_each_step() {
        let records = vec![
            row("2024-03-01 08:00:00", 0, 1, 0),
            row("2024-03-01 08:01:00", 1, 0, 1),
        ];
        // Unclamped sum would be 0
        assert_eq!(replay(&records), 1);
        assert_eq!(replay(&[]), 0);
    }

    #[test]
    fn test_daily_count_clamped() {
        let (store, shelter) = seeded_store();

        let first = daily_count(&store, &shelter.shelter_id, day("2024-03-01")).unwrap();
        assert_eq!(first.daily_count, 1);
        assert_eq!(first.day, "2024-03-01");

        let third = daily_count(&store, &shelter.shelter_id, day("2024-03-03")).unwrap();
        assert_eq!(third.daily_count, 0);

        let empty = daily_count(&store, &shelter.shelter_id, day("2024-04-01")).unwrap();
        assert_eq!(empty.daily_count, 0);
    }

    #[test]
    fn test_weekly_by_day_fills_gaps() {
        let (store, shelter) = seeded_store();
        let range = DateRange::new(day("2024-02-29"), day("2024-03-04")).unwrap();

        let weekly = weekly_by_day(&store, &shelter, range).unwrap();
        let counts: Vec<(&str, i64)> = weekly
            .weekly_data
            .iter()
            .map(|d| (d.date.as_str(), d.count))
            .collect();

        assert_eq!(
            counts,
            vec![
                ("2024-02-29", 0),
                ("2024-03-01", 1),
                ("2024-03-02", 0),
                ("2024-03-03", 0),
                ("2024-03-04", 0),
            ]
        );
        assert_eq!(weekly.current_count, 0);
        assert_eq!(weekly.start_date, "2024-02-29");
        assert_eq!(weekly.end_date, "2024-03-04");
    }

    #[test]
    fn test_interval_is_not_netted() {
        let (store, shelter) = seeded_store();
        let range = DateRange::new(day("2024-03-01"), day("2024-03-03")).unwrap();

        let interval = interval_count(&store, &shelter.shelter_id, range).unwrap();
        assert_eq!(interval.people_in, 2);
        assert_eq!(interval.people_out, 3);
    }
}
