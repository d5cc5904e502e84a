use std::time::{Duration, Instant};

use crate::cloud::{CloudApi, RawCloudReading};
use crate::driver::types::{CanonicalSnapshot, SourceStats};
use crate::error::Result;
use crate::status::map_cloud_status;

/// What the rate-limited cloud source produced for one tick
#[derive(Debug, Clone, PartialEq)]
pub enum CloudPoll {
    /// Fetched during this tick
    Fresh(RawCloudReading),
    /// Reused from the last successful fetch inside the rate-limit window
    Cached(RawCloudReading),
    /// Last fetch failed; next attempt allowed after the given delay
    Waiting(Duration),
}

/// Cloud API behind the fetch rate limit
pub struct CloudSource {
    api: Box<dyn CloudApi>,
    min_interval: Duration,
    last_attempt: Option<Instant>,
    cached: Option<RawCloudReading>,
    pub(crate) stats: SourceStats,
}

impl CloudSource {
    pub fn new(api: Box<dyn CloudApi>, min_interval: Duration) -> Self {
        Self {
            api,
            min_interval,
            last_attempt: None,
            cached: None,
            stats: SourceStats::default(),
        }
    }

    /// Whether a fetch is allowed at `now`; the first one always is
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_attempt
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }

    pub fn cached(&self) -> Option<&RawCloudReading> {
        self.cached.as_ref()
    }

    pub async fn poll(&mut self, now: Instant) -> Result<CloudPoll> {
        if !self.is_due(now) {
            return Ok(match &self.cached {
                Some(reading) => CloudPoll::Cached(reading.clone()),
                None => CloudPoll::Waiting(self.retry_in(now)),
            });
        }

        self.last_attempt = Some(now);
        match self.api.fetch().await {
            Ok(reading) => {
                self.stats.record_success();
                self.cached = Some(reading.clone());
                Ok(CloudPoll::Fresh(reading))
            }
            Err(e) => {
                self.stats.record_failure(&e);
                self.cached = None;
                Err(e)
            }
        }
    }

    fn retry_in(&self, now: Instant) -> Duration {
        self.last_attempt.map_or(Duration::ZERO, |last| {
            self.min_interval
                .saturating_sub(now.saturating_duration_since(last))
        })
    }
}

/// Round to two decimals
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fold a cloud reading into a new snapshot
///
/// The cloud reports a single phase: the configured phase mirrors the totals
/// and the voltage is the configured grid voltage.
pub(crate) fn fold_cloud(
    prev: &CanonicalSnapshot,
    reading: &RawCloudReading,
    grid_voltage: f64,
) -> CanonicalSnapshot {
    let power = reading.ac_power;
    let current = if grid_voltage == 0.0 {
        0.0
    } else {
        round2(power / grid_voltage)
    };

    let mut next = prev.clone();
    next.status = map_cloud_status(reading.status_code);
    next.ac_power = power;
    next.ac_current = current;
    next.ac_voltage = grid_voltage;
    next.energy_forward = reading.yield_total;
    if let Some(phase) = next.phases.first_mut() {
        phase.power = power;
        phase.current = current;
        phase.voltage = grid_voltage;
        phase.energy_forward = reading.yield_total;
    }
    next
}
