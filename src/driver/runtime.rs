use serde_json::json;
use std::time::Instant;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Duration, MissedTickBehavior, interval, interval_at};

use crate::config::Config;
use crate::dbus::{DbusService, TextFormat};
use crate::error::{HeliosError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use crate::topology::resolve_paths;

use super::runtime_poll::ActiveSource;
use super::types::{CanonicalSnapshot, TickOutcome};

/// Victron product id used for SolaX pvinverters
pub const PRODUCT_ID: u32 = 0xA144;

/// Resolves with the name of the first shutdown signal: Ctrl-C, or SIGTERM
/// as sent by the service supervisor
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| HeliosError::io(format!("Failed to install SIGTERM handler: {}", e)))?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

/// Serial used for the bus identity: the configured override, else the
/// active source's report
pub async fn resolve_serial(config: &Config, source: &mut ActiveSource) -> Result<String> {
    if let Some(serial) = config.inverter.serial.as_deref().map(str::trim)
        && !serial.is_empty()
    {
        return Ok(serial.to_string());
    }
    source.read_serial(Instant::now()).await
}

impl super::InverterDriver {
    pub fn new(config: Config, source: ActiveSource, dbus: DbusService) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("driver")
                .with_source(config.source.as_str())
                .with_device_instance(config.inverter.device_instance),
        );
        let paths = resolve_paths(&config);
        let snapshot = CanonicalSnapshot::new(config.phases.len());
        Self {
            config,
            source,
            dbus,
            paths,
            snapshot,
            last_tick: None,
            logger,
        }
    }

    pub fn snapshot(&self) -> &CanonicalSnapshot {
        &self.snapshot
    }

    pub fn paths(&self) -> &crate::topology::PathSet {
        &self.paths
    }

    pub fn dbus(&self) -> &DbusService {
        &self.dbus
    }

    pub fn source(&self) -> &ActiveSource {
        &self.source
    }

    /// Register management, identity and data paths
    pub async fn register_paths(&mut self, serial: &str) -> Result<()> {
        let inverter = self.config.inverter.clone();
        let identity = [
            ("/Mgmt/ProcessName", json!(env!("CARGO_PKG_NAME")), TextFormat::Plain),
            ("/Mgmt/ProcessVersion", json!(env!("APP_VERSION")), TextFormat::Plain),
            ("/Mgmt/Connection", json!(self.config.connection_string()), TextFormat::Plain),
            ("/DeviceInstance", json!(inverter.device_instance), TextFormat::Plain),
            ("/ProductId", json!(PRODUCT_ID), TextFormat::Hex),
            ("/ProductName", json!(inverter.product_name), TextFormat::Plain),
            ("/CustomName", json!(inverter.product_name), TextFormat::Plain),
            ("/FirmwareVersion", json!(1), TextFormat::Plain),
            ("/Connected", json!(1), TextFormat::Plain),
            ("/ErrorCode", json!(0), TextFormat::Plain),
            ("/Position", json!(inverter.position), TextFormat::Plain),
            ("/Serial", json!(serial), TextFormat::Plain),
            ("/StatusCode", json!(self.snapshot.status.code()), TextFormat::StatusCode),
            ("/Ac/MaxPower", json!(inverter.max_power), TextFormat::Watt),
            ("/Ac/PowerLimit", serde_json::Value::Null, TextFormat::Watt),
            ("/UpdateIndex", json!(0), TextFormat::Plain),
        ];
        for (path, value, format) in identity {
            self.dbus.register(path, value, format, false).await?;
        }

        let specs = self.paths.specs().to_vec();
        for spec in specs {
            self.dbus
                .register(&spec.path, json!(0), spec.format, true)
                .await?;
        }
        self.logger.info(&format!(
            "Registered {} paths for {}",
            self.dbus.path_count(),
            self.dbus.service_name()
        ));
        Ok(())
    }

    /// Connect the D-Bus service and claim the service name
    pub async fn start_dbus(&mut self) -> Result<()> {
        self.dbus.start().await
    }

    /// Main loop: periodic ticks and sign-of-life logs until SIGINT or SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting main loop (poll interval {} ms, source {})",
            self.config.poll_interval_ms,
            self.config.source.as_str()
        ));

        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sign_of_life = (self.config.sign_of_life_minutes > 0).then(|| {
            let period = Duration::from_secs(self.config.sign_of_life_minutes * 60);
            interval_at(tokio::time::Instant::now() + period, period)
        });

        let shutdown = shutdown_signal()?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                tick_at = poll_interval.tick() => {
                    match self.tick(tick_at.into_std()).await {
                        Ok(TickOutcome::Published { .. }) => {}
                        Ok(TickOutcome::Waiting { retry_in }) => {
                            self.logger.trace(&format!(
                                "Waiting {} s before next cloud fetch",
                                retry_in.as_secs()
                            ));
                        }
                        Err(e) if e.is_tick_scoped() => {
                            self.logger.warn(&format!("Update failed: {}", e));
                        }
                        Err(e) => {
                            self.logger.error(&format!("Update failed: {}", e));
                        }
                    }
                }
                _ = async {
                    match sign_of_life.as_mut() {
                        Some(timer) => { timer.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.log_sign_of_life();
                }
                name = &mut shutdown => {
                    self.logger.info(&format!("Shutdown signal received ({})", name));
                    break;
                }
            }
        }

        self.dbus.stop().await?;
        self.logger.info("Driver shutdown complete");
        Ok(())
    }
}
