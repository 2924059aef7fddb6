//! Occupancy engine

use chrono::{NaiveDate, NaiveDateTime};
use shelter_api::{
    AggregateKind, AggregateQuery, AggregateResult, GateDecision, HealthStatus, IngestOutcome,
    ReconcileReport, SensorReading, SensorRole, ShelterView, parse_sensor_status,
};
use shelter_config::ShelterSeed;
use shelter_store::{LedgerRecord, ShelterRecord, Store};
use shelter_util::{DateRange, Result, ShelterError, ShelterId, parse_event_time};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{DebounceGate, aggregate, credential};

/// In-memory state for one shelter, guarded by its own lock
#[derive(Debug)]
pub struct ShelterState {
    pub gate: DebounceGate,
    /// Occupancy after the last committed ledger row
    pub count: i64,
}

impl ShelterState {
    /// Rebuild state from the latest ledger row, if any
    pub fn warm(window: Duration, last: Option<&LedgerRecord>) -> Self {
        match last {
            Some(record) => {
                let role = if record.people_in == 1 {
                    SensorRole::Entry
                } else {
                    SensorRole::Exit
                };
                Self {
                    gate: DebounceGate::seeded(window, role, record.timestamp),
                    count: record.resulting_count,
                }
            }
            None => Self {
                gate: DebounceGate::new(window),
                count: 0,
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The occupancy engine.
///
/// All methods take `&self`; events for one shelter are serialized on that
/// shelter's lock while different shelters proceed in parallel.
pub struct OccupancyEngine {
    store: Arc<dyn Store>,
    debounce_window: Duration,
    shelters: Mutex<HashMap<ShelterId, Arc<Mutex<ShelterState>>>>,
}

impl OccupancyEngine {
    pub fn new(store: Arc<dyn Store>, debounce_window: Duration) -> Self {
        info!(
            debounce_window_secs = debounce_window.as_secs(),
            "Occupancy engine initialized"
        );

        Self {
            store,
            debounce_window,
            shelters: Mutex::new(HashMap::new()),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    /// Register or refresh every configured shelter. Returns how many were new.
    pub fn provision(&self, seeds: &[ShelterSeed]) -> Result<usize> {
        let mut created = 0;
        for seed in seeds {
            if self
                .store
                .provision_shelter(&seed.id, &seed.credential_fingerprint)?
            {
                created += 1;
            }
        }

        info!(total = seeds.len(), created, "Shelters provisioned");
        Ok(created)
    }

    /// Look up a shelter and check the presented secret against its fingerprint
    fn authenticate(&self, shelter_id: &ShelterId, secret: &str) -> Result<ShelterRecord> {
        let shelter = self
            .store
            .get_shelter(shelter_id)?
            .ok_or_else(|| ShelterError::NotFound(shelter_id.clone()))?;

        if !credential::verify(secret, &shelter.credential_fingerprint) {
            warn!(shelter_id = %shelter_id, "Credential rejected");
            return Err(ShelterError::Unauthorized(shelter_id.clone()));
        }

        Ok(shelter)
    }

    fn require_shelter(&self, shelter_id: &ShelterId) -> Result<ShelterRecord> {
        self.store
            .get_shelter(shelter_id)?
            .ok_or_else(|| ShelterError::NotFound(shelter_id.clone()))
    }

    /// Get (or warm-start) the state for a shelter.
    ///
    /// The ledger lookup runs without the map lock held; if two callers
    /// warm-start the same shelter at once, the first insert wins.
    fn state_for(&self, shelter_id: &ShelterId) -> Result<Arc<Mutex<ShelterState>>> {
        if let Some(state) = lock(&self.shelters).get(shelter_id) {
            return Ok(Arc::clone(state));
        }

        let last = self.store.last_ledger_record(shelter_id)?;
        let loaded = ShelterState::warm(self.debounce_window, last.as_ref());

        let mut shelters = lock(&self.shelters);
        let state = shelters.entry(shelter_id.clone()).or_insert_with(|| {
            debug!(
                shelter_id = %shelter_id,
                count = loaded.count,
                last_accepted = ?loaded.gate.last_accepted(),
                "Shelter state loaded"
            );
            Arc::new(Mutex::new(loaded))
        });

        Ok(Arc::clone(state))
    }

    /// Authenticate, debounce and (if it passes) count one sensor reading.
    ///
    /// Nothing is mutated unless the reading is authentic and well formed.
    /// The gate and cached count only move after the ledger commit succeeds,
    /// so a failed commit can be retried with the same timestamp.
    pub fn ingest_event(&self, reading: &SensorReading) -> Result<IngestOutcome> {
        let shelter_id = &reading.shelter_id;
        self.authenticate(shelter_id, &reading.credential)?;

        let timestamp = parse_event_time(&reading.timestamp)?;
        let role = reading.sensor_id.resolve()?;
        let triggered = parse_sensor_status(&reading.status)?;

        let state = self.state_for(shelter_id)?;
        let mut state = lock(&state);

        if !state.gate.admits(role, timestamp) {
            self.store.touch_activity(shelter_id, timestamp)?;
            debug!(
                shelter_id = %shelter_id,
                %role,
                timestamp = %timestamp,
                "Event suppressed by debounce gate"
            );
            return Ok(IngestOutcome {
                accepted: false,
                counter: state.count,
                decision: GateDecision::Suppressed,
            });
        }

        if !triggered {
            self.store.touch_activity(shelter_id, timestamp)?;
            state.gate.record(role, timestamp);
            debug!(
                shelter_id = %shelter_id,
                %role,
                timestamp = %timestamp,
                "Clear reading passed gate"
            );
            return Ok(IngestOutcome {
                accepted: false,
                counter: state.count,
                decision: GateDecision::Cleared,
            });
        }

        let (people_in, people_out) = match role {
            SensorRole::Entry => (1, 0),
            SensorRole::Exit => (0, 1),
        };
        let resulting_count = (state.count + role.delta()).max(0);

        let record = LedgerRecord::new(
            shelter_id.clone(),
            timestamp,
            people_in,
            people_out,
            resulting_count,
        );

        let row_id = self.store.commit_ledger(&record).inspect_err(|e| {
            warn!(shelter_id = %shelter_id, error = %e, "Ledger commit failed");
        })?;

        let previous = state.count;
        state.gate.record(role, timestamp);
        state.count = resulting_count;

        if previous + role.delta() < 0 {
            info!(shelter_id = %shelter_id, "Exit at zero occupancy, count clamped");
        }

        info!(
            shelter_id = %shelter_id,
            %role,
            timestamp = %timestamp,
            ledger_id = row_id,
            previous,
            count = resulting_count,
            "Crossing counted"
        );

        Ok(IngestOutcome {
            accepted: true,
            counter: resulting_count,
            decision: GateDecision::Counted,
        })
    }

    /// Refresh a shelter's last activity without touching the count
    pub fn record_heartbeat(
        &self,
        shelter_id: &ShelterId,
        timestamp: &str,
        secret: &str,
    ) -> Result<NaiveDateTime> {
        self.authenticate(shelter_id, secret)?;
        let at = parse_event_time(timestamp)?;

        self.store.touch_activity(shelter_id, at)?;
        debug!(shelter_id = %shelter_id, at = %at, "Heartbeat recorded");

        Ok(at)
    }

    /// Answer an aggregate query. `today` anchors the default date ranges.
    pub fn query(&self, query: &AggregateQuery, today: NaiveDate) -> Result<AggregateResult> {
        let shelter = self.require_shelter(&query.shelter_id)?;
        let store = self.store.as_ref();

        let result = match query.kind {
            AggregateKind::Current => AggregateResult::Current {
                shelter_id: shelter.shelter_id,
                current_count: shelter.current_count,
            },
            AggregateKind::Daily => {
                let day = query.day.unwrap_or(today);
                AggregateResult::Daily(aggregate::daily_count(store, &shelter.shelter_id, day)?)
            }
            AggregateKind::WeeklyByDay => {
                let range = DateRange::resolve(query.start, query.end, today)?;
                AggregateResult::WeeklyByDay(aggregate::weekly_by_day(store, &shelter, range)?)
            }
            AggregateKind::Interval => {
                let range = DateRange::resolve(query.start, query.end, today)?;
                AggregateResult::Interval(aggregate::interval_count(
                    store,
                    &shelter.shelter_id,
                    range,
                )?)
            }
        };

        Ok(result)
    }

    /// All registered shelters, without their fingerprints
    pub fn list_shelters(&self) -> Result<Vec<ShelterView>> {
        Ok(self
            .store
            .list_shelters()?
            .into_iter()
            .map(|s| ShelterView {
                shelter_id: s.shelter_id,
                current_count: s.current_count,
                last_activity: s.last_activity,
            })
            .collect())
    }

    /// Check a shelter's cached counter against a replay of its ledger and
    /// rewrite the cache if they disagree.
    pub fn reconcile(&self, shelter_id: &ShelterId) -> Result<ReconcileReport> {
        self.require_shelter(shelter_id)?;

        let state = self.state_for(shelter_id)?;
        let mut state = lock(&state);

        // Re-read under the shelter lock so no commit lands in between
        let cached_count = self.require_shelter(shelter_id)?.current_count;
        let records = self.store.ledger_records(shelter_id)?;
        let ledger_count = aggregate::replay(&records);

        if let Some(last) = records.last()
            && last.resulting_count != ledger_count
        {
            warn!(
                shelter_id = %shelter_id,
                ledger_id = last.id,
                recorded = last.resulting_count,
                replayed = ledger_count,
                "Last ledger row disagrees with replay"
            );
        }

        let repaired = cached_count != ledger_count;
        if repaired {
            self.store.set_cached_count(shelter_id, ledger_count)?;
            warn!(
                shelter_id = %shelter_id,
                cached_count,
                ledger_count,
                "Cached counter repaired from ledger"
            );
        }
        state.count = ledger_count;

        Ok(ReconcileReport {
            shelter_id: shelter_id.clone(),
            ledger_rows: records.len(),
            cached_count,
            ledger_count,
            repaired,
        })
    }

    /// Reconcile every registered shelter
    pub fn reconcile_all(&self) -> Result<Vec<ReconcileReport>> {
        let shelters = self.store.list_shelters()?;
        let mut reports = Vec::with_capacity(shelters.len());

        for shelter in shelters {
            reports.push(self.reconcile(&shelter.shelter_id)?);
        }

        let repaired = reports.iter().filter(|r| r.repaired).count();
        info!(shelters = reports.len(), repaired, "Reconciliation complete");

        Ok(reports)
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok,
            store_ok,
        }
    }
}
