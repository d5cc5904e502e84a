use crate::status::CanonicalStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Output of one AC phase as published under `/Ac/{Phase}/...`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseValues {
    pub power: f64,
    pub current: f64,
    pub voltage: f64,
    pub energy_forward: f64,
}

/// DC input of one tracker as published under `/Pv/{index}/...`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackerValues {
    pub power: f64,
    pub voltage: f64,
}

/// Normalized inverter state owned by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSnapshot {
    pub status: CanonicalStatus,
    pub ac_power: f64,
    pub ac_current: f64,
    pub ac_voltage: f64,
    pub energy_forward: f64,
    /// One entry per configured phase, in configured order
    pub phases: Vec<PhaseValues>,
    /// One entry per tracker up to the highest index ever discovered
    pub trackers: Vec<TrackerValues>,
    pub yield_power: f64,
    pub update_index: u8,
}

impl CanonicalSnapshot {
    pub fn new(phase_count: usize) -> Self {
        Self {
            status: CanonicalStatus::Startup(0),
            ac_power: 0.0,
            ac_current: 0.0,
            ac_voltage: 0.0,
            energy_forward: 0.0,
            phases: vec![PhaseValues::default(); phase_count],
            trackers: Vec::new(),
            yield_power: 0.0,
            update_index: 0,
        }
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }
}

/// Fetch statistics of the active source
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pub successes: u64,
    pub failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SourceStats {
    pub fn record_success(&mut self) {
        self.successes = self.successes.saturating_add(1);
        self.last_success = Some(Utc::now());
    }

    pub fn record_failure(&mut self, error: &crate::error::HeliosError) {
        self.failures = self.failures.saturating_add(1);
        self.last_error = Some(error.to_string());
    }
}

/// Result of a tick that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new snapshot was committed and published
    Published {
        update_index: u8,
        /// Whether the source was queried during this tick
        fetched: bool,
    },
    /// The last cloud fetch failed and the rate limit blocks a retry
    Waiting { retry_in: Duration },
}
