use crate::driver::types::{CanonicalSnapshot, SourceStats, TrackerValues};
use crate::error::{HeliosError, Result};
use crate::modbus::{FieldBusSource, RawFieldBusReading};
use crate::status::map_run_mode;

/// Field-bus source with its fetch statistics; fetched on every tick
pub struct FieldBusPoller {
    source: FieldBusSource,
    pub(crate) stats: SourceStats,
}

impl FieldBusPoller {
    pub fn new(source: FieldBusSource) -> Self {
        Self {
            source,
            stats: SourceStats::default(),
        }
    }

    pub async fn poll(&mut self) -> Result<RawFieldBusReading> {
        match self.source.fetch().await {
            Ok(reading) => {
                self.stats.record_success();
                Ok(reading)
            }
            Err(e) => {
                self.stats.record_failure(&e);
                Err(e)
            }
        }
    }

    pub async fn read_serial(&mut self) -> Result<String> {
        self.source.read_serial().await
    }
}

/// Fold a field-bus reading into a new snapshot
///
/// Totals are sums across phases, energy comes from the inverter's total
/// yield. Trackers missing from this reading keep their last values and the
/// tracker count never decreases.
pub(crate) fn fold_fieldbus(
    prev: &CanonicalSnapshot,
    reading: &RawFieldBusReading,
) -> Result<CanonicalSnapshot> {
    if reading.phases.len() != prev.phases.len() {
        return Err(HeliosError::device(format!(
            "Expected {} phase readings, got {}",
            prev.phases.len(),
            reading.phases.len()
        )));
    }
    if reading.trackers.is_empty() {
        return Err(HeliosError::device("No PV trackers reported by the inverter"));
    }

    let mut next = prev.clone();
    next.status = map_run_mode(i64::from(reading.run_mode));

    for (phase, raw) in next.phases.iter_mut().zip(&reading.phases) {
        phase.power = raw.power;
        phase.current = raw.current;
        phase.voltage = raw.voltage;
    }
    next.ac_power = reading.phases.iter().map(|p| p.power).sum();
    next.ac_current = reading.phases.iter().map(|p| p.current).sum();
    next.ac_voltage =
        reading.phases.iter().map(|p| p.voltage).sum::<f64>() / reading.phases.len() as f64;
    next.energy_forward = reading.total_yield;
    // A per-phase split of the counter is not available
    if let [only] = next.phases.as_mut_slice() {
        only.energy_forward = reading.total_yield;
    }

    if next.trackers.len() < reading.trackers.len() {
        next.trackers
            .resize(reading.trackers.len(), TrackerValues::default());
    }
    for (tracker, raw) in next.trackers.iter_mut().zip(&reading.trackers) {
        tracker.power = raw.power;
        tracker.voltage = raw.voltage;
    }
    next.yield_power = reading.trackers.iter().map(|t| t.power).sum();

    Ok(next)
}
