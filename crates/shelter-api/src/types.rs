//! Shared types for the shelterd API

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use shelter_util::{ShelterError, ShelterId};
use std::fmt;
use std::str::FromStr;

/// Which physical beam a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    Entry,
    Exit,
}

impl SensorRole {
    /// Sensors are wired as id 1 (entry) and id 2 (exit).
    pub fn from_sensor_id(id: u32) -> Result<Self, ShelterError> {
        match id {
            1 => Ok(SensorRole::Entry),
            2 => Ok(SensorRole::Exit),
            other => Err(ShelterError::invalid_state(format!(
                "unknown sensor id {}",
                other
            ))),
        }
    }

    pub fn sensor_id(&self) -> u32 {
        match self {
            SensorRole::Entry => 1,
            SensorRole::Exit => 2,
        }
    }

    /// Signed occupancy change for a triggered reading
    pub fn delta(&self) -> i64 {
        match self {
            SensorRole::Entry => 1,
            SensorRole::Exit => -1,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            SensorRole::Entry => 0,
            SensorRole::Exit => 1,
        }
    }
}

impl fmt::Display for SensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorRole::Entry => write!(f, "entry"),
            SensorRole::Exit => write!(f, "exit"),
        }
    }
}

impl FromStr for SensorRole {
    type Err = ShelterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entry" | "in" | "1" => Ok(SensorRole::Entry),
            "exit" | "out" | "2" => Ok(SensorRole::Exit),
            other => Err(ShelterError::invalid_state(format!(
                "unknown sensor role '{}'",
                other
            ))),
        }
    }
}

/// Sensor identification as sent on the wire: a numeric id or a role name.
///
/// Any other JSON shape still deserializes so the request is rejected as an
/// unknown sensor rather than as a malformed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorRef {
    Id(u32),
    Role(String),
    Other(serde_json::Value),
}

impl SensorRef {
    pub fn resolve(&self) -> Result<SensorRole, ShelterError> {
        match self {
            SensorRef::Id(id) => SensorRole::from_sensor_id(*id),
            SensorRef::Role(name) => name.parse(),
            SensorRef::Other(value) => Err(ShelterError::invalid_state(format!(
                "unknown sensor id {}",
                value
            ))),
        }
    }
}

impl From<SensorRole> for SensorRef {
    fn from(role: SensorRole) -> Self {
        SensorRef::Id(role.sensor_id())
    }
}

/// Interpret a sensor status string.
///
/// `Obstacle` means the beam is broken. `Clear` / `No Obstacle` mean it is
/// not. Anything else is rejected.
pub fn parse_sensor_status(status: &str) -> Result<bool, ShelterError> {
    let normalized = status.trim().to_lowercase().replace(['_', '-'], " ");
    match normalized.as_str() {
        "obstacle" => Ok(true),
        "clear" | "no obstacle" => Ok(false),
        _ => Err(ShelterError::invalid_state(format!(
            "unknown sensor status '{}'",
            status
        ))),
    }
}

/// One raw reading from a sensor, exactly as presented by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub shelter_id: ShelterId,
    pub sensor_id: SensorRef,
    pub status: String,
    pub timestamp: String,
    /// Plaintext shared secret, checked against the stored fingerprint
    pub credential: String,
}

/// What the debounce gate decided about an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Passed the gate and changed the ledger
    Counted,
    /// Passed the gate but reported a clear beam, so no delta
    Cleared,
    /// Rejected as a bounce, duplicate, or out-of-order event
    Suppressed,
}

/// Result of ingesting one sensor event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// True only when a ledger row was written
    pub accepted: bool,
    /// Occupancy after this call
    pub counter: i64,
    pub decision: GateDecision,
}

/// Aggregate query kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Current,
    Daily,
    WeeklyByDay,
    Interval,
}

/// Read-side query against one shelter's ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub kind: AggregateKind,
    pub shelter_id: ShelterId,
    /// Day for `daily` (default: today)
    #[serde(default)]
    pub day: Option<NaiveDate>,
    /// Range bounds for `weekly_by_day` and `interval` (default: trailing week)
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl AggregateQuery {
    pub fn new(kind: AggregateKind, shelter_id: impl Into<ShelterId>) -> Self {
        Self {
            kind,
            shelter_id: shelter_id.into(),
            day: None,
            start: None,
            end: None,
        }
    }

    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.day = Some(day);
        self
    }

    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Net count for a single day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub daily_count: i64,
    pub day: String,
}

/// One entry of a by-day breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

/// By-day breakdown over a date range, gaps filled with zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCount {
    pub weekly_data: Vec<DayCount>,
    pub current_count: i64,
    pub start_date: String,
    pub end_date: String,
}

/// Separate in/out totals over a date range (not netted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalCount {
    pub people_in: i64,
    pub people_out: i64,
    pub start_date: String,
    pub end_date: String,
}

/// Result of an aggregate query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateResult {
    Current { shelter_id: ShelterId, current_count: i64 },
    Daily(DailyCount),
    WeeklyByDay(WeeklyCount),
    Interval(IntervalCount),
}

/// Public view of a registered shelter (never includes the fingerprint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelterView {
    pub shelter_id: ShelterId,
    pub current_count: i64,
    pub last_activity: Option<NaiveDateTime>,
}

/// Outcome of checking a shelter's cached counter against its ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub shelter_id: ShelterId,
    pub ledger_rows: usize,
    pub cached_count: i64,
    pub ledger_count: i64,
    /// True when the cache disagreed and was rewritten from the ledger
    pub repaired: bool,
}

/// Role of an IPC client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Sensor gateways and dashboards: ingest, heartbeat, queries
    Reporter,
    /// Local admin: can also trigger reconciliation
    Admin,
}

impl ClientRole {
    pub fn can_reconcile(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Client connection info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub role: ClientRole,
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self { role, uid: None }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_ids_map_to_roles() {
        assert_eq!(SensorRole::from_sensor_id(1).unwrap(), SensorRole::Entry);
        assert_eq!(SensorRole::from_sensor_id(2).unwrap(), SensorRole::Exit);
        assert!(matches!(
            SensorRole::from_sensor_id(3),
            Err(ShelterError::InvalidState(_))
        ));
    }

    #[test]
    fn sensor_ref_accepts_number_or_name() {
        let by_id: SensorRef = serde_json::from_str("2").unwrap();
        assert_eq!(by_id.resolve().unwrap(), SensorRole::Exit);

        let by_name: SensorRef = serde_json::from_str("\"Entry\"").unwrap();
        assert_eq!(by_name.resolve().unwrap(), SensorRole::Entry);

        let bogus: SensorRef = serde_json::from_str("\"sideways\"").unwrap();
        assert!(bogus.resolve().is_err());

        for raw in ["-1", "1.5", "null", "[1]"] {
            let odd: SensorRef = serde_json::from_str(raw).unwrap();
            assert!(matches!(odd, SensorRef::Other(_)), "{}", raw);
            assert!(
                matches!(odd.resolve(), Err(ShelterError::InvalidState(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn status_strings() {
        assert!(parse_sensor_status("Obstacle").unwrap());
        assert!(parse_sensor_status("OBSTACLE").unwrap());
        assert!(!parse_sensor_status("Clear").unwrap());
        assert!(!parse_sensor_status("No Obstacle").unwrap());
        assert!(!parse_sensor_status("no_obstacle").unwrap());
        assert!(parse_sensor_status("maybe").is_err());
    }

    #[test]
    fn aggregate_query_optional_fields_default() {
        let json = r#"{"kind":"daily","shelter_id":"abc"}"#;
        let q: AggregateQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q.kind, AggregateKind::Daily);
        assert!(q.day.is_none() && q.start.is_none() && q.end.is_none());
    }

    #[test]
    fn role_permissions() {
        assert!(ClientRole::Admin.can_reconcile());
        assert!(!ClientRole::Reporter.can_reconcile());
    }
}
