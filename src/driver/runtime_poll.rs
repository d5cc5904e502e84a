use std::time::{Duration, Instant};

use crate::cloud::CloudClient;
use crate::config::{Config, SourceKind};
use crate::error::{HeliosError, Result};
use crate::modbus::FieldBusSource;
use crate::topology::{
    AC_CURRENT, AC_ENERGY_FORWARD, AC_POWER, AC_VOLTAGE, NR_OF_TRACKERS, YIELD_POWER,
};

mod cloud;
mod fieldbus;

pub use cloud::{CloudPoll, CloudSource};
pub use fieldbus::FieldBusPoller;

use super::types::{SourceStats, TickOutcome};

/// The single telemetry source selected at startup
pub enum ActiveSource {
    Cloud(CloudSource),
    FieldBus(FieldBusPoller),
}

impl ActiveSource {
    /// Build the production source for the configured kind
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(match config.source {
            SourceKind::Cloud => {
                let client = CloudClient::new(&config.cloud)?;
                ActiveSource::Cloud(CloudSource::new(
                    Box::new(client),
                    Duration::from_secs(config.cloud.min_fetch_interval_seconds),
                ))
            }
            SourceKind::Modbus => ActiveSource::FieldBus(FieldBusPoller::new(
                FieldBusSource::from_config(&config.modbus, config.phase_numbers()),
            )),
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            ActiveSource::Cloud(_) => SourceKind::Cloud,
            ActiveSource::FieldBus(_) => SourceKind::Modbus,
        }
    }

    pub fn stats(&self) -> &SourceStats {
        match self {
            ActiveSource::Cloud(s) => &s.stats,
            ActiveSource::FieldBus(s) => &s.stats,
        }
    }

    /// Read the inverter serial from the source
    ///
    /// For the cloud this is a regular rate-limited fetch, so the first tick
    /// reuses its reading.
    pub async fn read_serial(&mut self, now: Instant) -> Result<String> {
        let serial = match self {
            ActiveSource::Cloud(source) => match source.poll(now).await? {
                CloudPoll::Fresh(r) | CloudPoll::Cached(r) => r.serial,
                CloudPoll::Waiting(_) => String::new(),
            },
            ActiveSource::FieldBus(source) => source.read_serial().await?,
        };
        if serial.trim().is_empty() {
            return Err(HeliosError::config(
                "Inverter serial is not available from the active source",
            ));
        }
        Ok(serial.trim().to_string())
    }
}

impl super::InverterDriver {
    /// Run one acquisition cycle
    ///
    /// On error the snapshot, the update index and every published value are
    /// left untouched.
    pub async fn tick(&mut self, now: Instant) -> Result<TickOutcome> {
        let grid_voltage = self.config.inverter.grid_voltage;
        let (mut next, fetched) = match &mut self.source {
            ActiveSource::Cloud(source) => match source.poll(now).await? {
                CloudPoll::Fresh(reading) => {
                    self.logger.debug(&format!(
                        "Cloud update - status code {} power {} W",
                        reading.status_code, reading.ac_power
                    ));
                    (cloud::fold_cloud(&self.snapshot, &reading, grid_voltage), true)
                }
                CloudPoll::Cached(reading) => {
                    (cloud::fold_cloud(&self.snapshot, &reading, grid_voltage), false)
                }
                CloudPoll::Waiting(retry_in) => {
                    return Ok(TickOutcome::Waiting { retry_in });
                }
            },
            ActiveSource::FieldBus(source) => {
                let reading = source.poll().await?;
                (fieldbus::fold_fieldbus(&self.snapshot, &reading)?, true)
            }
        };

        next.update_index = self.snapshot.update_index.wrapping_add(1);

        // Tracker paths must exist before their values are written
        let added = self.paths.ensure_trackers(next.tracker_count());
        if !added.is_empty() {
            self.logger.info(&format!(
                "Tracker count changed to {}; registering {} new path(s)",
                next.tracker_count(),
                added.len()
            ));
            for spec in added {
                if let Err(e) = self
                    .dbus
                    .register(&spec.path, serde_json::json!(0), spec.format, true)
                    .await
                {
                    self.logger
                        .error(&format!("Failed to register {}: {}", spec.path, e));
                }
            }
        }

        let update_index = next.update_index;
        self.snapshot = next;
        self.last_tick = Some(chrono::Utc::now());
        self.publish().await;

        Ok(TickOutcome::Published {
            update_index,
            fetched,
        })
    }

    /// Path/value pairs for the current snapshot, `/UpdateIndex` last
    pub(crate) fn snapshot_updates(&self) -> Vec<(String, serde_json::Value)> {
        use serde_json::json;
        let snap = &self.snapshot;
        let mut updates = vec![
            (AC_POWER.to_string(), json!(snap.ac_power)),
            (AC_CURRENT.to_string(), json!(snap.ac_current)),
            (AC_VOLTAGE.to_string(), json!(snap.ac_voltage)),
            (AC_ENERGY_FORWARD.to_string(), json!(snap.energy_forward)),
        ];

        for (paths, values) in self.paths.phases().iter().zip(&snap.phases) {
            updates.push((paths.voltage.clone(), json!(values.voltage)));
            updates.push((paths.current.clone(), json!(values.current)));
            updates.push((paths.power.clone(), json!(values.power)));
            updates.push((paths.energy_forward.clone(), json!(values.energy_forward)));
        }

        if self.paths.contains(NR_OF_TRACKERS) {
            updates.push((NR_OF_TRACKERS.to_string(), json!(snap.tracker_count())));
            updates.push((YIELD_POWER.to_string(), json!(snap.yield_power)));
        }
        for (index, values) in snap.trackers.iter().enumerate() {
            if let Some(paths) = self.paths.tracker(index) {
                updates.push((paths.voltage.clone(), json!(values.voltage)));
                updates.push((paths.power.clone(), json!(values.power)));
            }
        }

        updates.push(("/StatusCode".to_string(), json!(snap.status.code())));
        updates.push(("/UpdateIndex".to_string(), json!(snap.update_index)));
        updates
    }

    async fn publish(&mut self) {
        let updates = self.snapshot_updates();
        if let Err(e) = self.dbus.update_paths(updates).await {
            self.logger.error(&format!("Failed to publish snapshot: {}", e));
        }
    }
}
