//! Debounce gate

use chrono::{NaiveDateTime, TimeDelta};
use shelter_api::SensorRole;
use std::time::Duration;

/// Per-shelter bounce filter.
///
/// An event at `t` from `role` passes only if `t` is strictly after both
/// `ignore_until[role]` and `last_accepted + window`. The gate only moves
/// when [`DebounceGate::record`] is called, so suppressed events never
/// push it backward or forward.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    window: TimeDelta,
    last_accepted: Option<NaiveDateTime>,
    ignore_until: [Option<NaiveDateTime>; 2],
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            last_accepted: None,
            ignore_until: [None, None],
        }
    }

    /// Gate that behaves as if `role` had just been accepted at `at`.
    pub fn seeded(window: Duration, role: SensorRole, at: NaiveDateTime) -> Self {
        let mut gate = Self::new(window);
        gate.record(role, at);
        gate
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn last_accepted(&self) -> Option<NaiveDateTime> {
        self.last_accepted
    }

    pub fn ignore_until(&self, role: SensorRole) -> Option<NaiveDateTime> {
        self.ignore_until[role.index()]
    }

    /// Whether an event would pass. Does not mutate.
    pub fn admits(&self, role: SensorRole, at: NaiveDateTime) -> bool {
        let role_open = match self.ignore_until[role.index()] {
            Some(until) => at > until,
            None => true,
        };

        let global_open = match self.last_accepted {
            // Overflow means the window never closes
            Some(last) => last
                .checked_add_signed(self.window)
                .is_some_and(|reopens| at > reopens),
            None => true,
        };

        role_open && global_open
    }

    /// Move the gate for an event that passed
    pub fn record(&mut self, role: SensorRole, at: NaiveDateTime) {
        self.last_accepted = Some(at);
        self.ignore_until[role.index()] = Some(
            at.checked_add_signed(self.window)
                .unwrap_or(NaiveDateTime::MAX),
        );
    }
}
