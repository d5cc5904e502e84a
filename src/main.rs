use anyhow::Result;
use helios::config::Config;
use helios::dbus::DbusService;
use helios::driver::{ActiveSource, InverterDriver, resolve_serial};
use helios::logging::{get_logger, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional explicit config path as the first argument
    let config_path = std::env::args().nth(1);
    let config = Config::load_from(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    let logger = get_logger("main");
    logger.info(&format!(
        "Helios {} starting up (source {})",
        env!("APP_VERSION"),
        config.source.as_str()
    ));

    let mut source = ActiveSource::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create telemetry source: {}", e))?;

    let serial = match resolve_serial(&config, &mut source).await {
        Ok(serial) => serial,
        Err(e) => {
            logger.error(&format!("Unable to determine inverter serial: {}", e));
            return Err(anyhow::anyhow!("Inverter serial unavailable: {}", e));
        }
    };
    logger.info(&format!("Inverter serial {}", serial));

    let dbus = DbusService::new(&serial)
        .map_err(|e| anyhow::anyhow!("Failed to create D-Bus service: {}", e))?;
    let mut driver = InverterDriver::new(config, source, dbus);
    driver
        .register_paths(&serial)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to register D-Bus paths: {}", e))?;
    driver
        .start_dbus()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start D-Bus service: {}", e))?;

    match driver.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            logger.error(&format!("Driver failed with error: {}", e));
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
