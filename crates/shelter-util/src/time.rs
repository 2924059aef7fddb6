//! Time utilities for shelterd
//!
//! Sensor events carry their own wall-clock timestamp (event time, not receipt
//! time). Everything here works on naive local time at second precision, which
//! is what the sensors send and what the ledger stores.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `SHELTER_MOCK_TIME` environment variable overrides the
//! current time used for "today" defaults in aggregate queries.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{
    DateTime, Days, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use std::sync::OnceLock;

use crate::{Result, ShelterError};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "SHELTER_MOCK_TIME";

/// Storage and wire format for event timestamps
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format for calendar days in query results
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Longest range an aggregate query may span
pub const MAX_RANGE_DAYS: i64 = 366;

/// Accepted input layouts for event timestamps, tried in order before RFC 3339
const EVENT_TIME_INPUT_FORMATS: &[&str] = &[
    EVENT_TIME_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Offset between mock time and real time at process start.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, EVENT_TIME_FORMAT) {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = EVENT_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Today's calendar date in local time.
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// Parse a sensor-supplied event timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated variant, either with a
/// fractional second, or RFC 3339 (converted to local time). The result is
/// truncated to whole seconds.
pub fn parse_event_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();

    let parsed = EVENT_TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
        .ok_or_else(|| {
            ShelterError::invalid_state(format!(
                "unparseable event time '{}', expected {}",
                s, EVENT_TIME_FORMAT
            ))
        })?;

    Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
}

/// Format an event timestamp for storage and display.
pub fn format_event_time(dt: &NaiveDateTime) -> String {
    dt.format(EVENT_TIME_FORMAT).to_string()
}

/// Format a calendar day as `YYYY-MM-DD`.
pub fn format_day(day: &NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ShelterError::invalid_state(format!(
                "range start {} is after end {}",
                start, end
            )));
        }

        let span = (end - start).num_days() + 1;
        if span > MAX_RANGE_DAYS {
            return Err(ShelterError::invalid_state(format!(
                "range spans {} days, limit is {}",
                span, MAX_RANGE_DAYS
            )));
        }

        Ok(Self { start, end })
    }

    /// Seven days ending on (and including) `end`.
    pub fn trailing_week(end: NaiveDate) -> Self {
        let start = end.checked_sub_days(Days::new(6)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Resolve optional query bounds against `today`.
    ///
    /// - neither bound: trailing week ending today
    /// - only `start`: `start..=today`
    /// - only `end`: trailing week ending at `end`
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        match (start, end) {
            (None, None) => Ok(Self::trailing_week(today)),
            (Some(start), None) => Self::new(start, today),
            (None, Some(end)) => Ok(Self::trailing_week(end)),
            (Some(start), Some(end)) => Self::new(start, end),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Every date in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn num_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }
}
