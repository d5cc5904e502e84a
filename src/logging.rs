//! Structured logging and tracing for Helios
//!
//! Console output plus a daily rolling log file, both fed from the tracing
//! ecosystem. Components log through [`StructuredLogger`] so every line carries
//! its component and source.

mod level;
mod state;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

use crate::config::LoggingConfig;
use crate::error::{HeliosError, Result};
use level::{layer_level, min_level};
use state::{INIT_ERROR, INIT_ONCE, LOG_GUARD};
use std::path::Path;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging system based on configuration
///
/// Only the first call installs a subscriber; later calls return the outcome
/// of that first initialization.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;
            let console_level = layer_level(config.console_level.as_ref(), base_level);
            let file_level = layer_level(config.file_level.as_ref(), base_level);

            // Global filter admits the most verbose layer; layers narrow it down
            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, console_level);
                return Ok(());
            }

            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(HeliosError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("helios={},tokio_modbus=warn", level).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("HELIOS_DISABLE_FILE_LOG").is_some()
}

fn console_layer<S>(json_format: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let base = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json_format {
        base.json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        base.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, console_level: Level) {
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(json_format, console_level))
        .init();

    info!(
        "Logging initialized - console_level: {:?}, console-only",
        console_level
    );
}

/// Directory receiving the rolling files: the parent of `file` when it names a
/// file, otherwise `file` itself
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("helios")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(log_directory(&config.file))
        .map_err(|e| HeliosError::io(format!("Failed to create log file appender: {}", e)))?;

    let (non_blocking_appender, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = {
        let base = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false);
        if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(file_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(file_level))
                .boxed()
        }
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.console_output {
        subscriber
            .with(console_layer(config.json_format, console_level))
            .init();
    } else {
        subscriber.init();
    }

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level, file_level, config.file
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logging() {
        INIT.call_once(|| {
            let config = LoggingConfig::default();
            init_logging(&config).ok();
        });
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_log_context() {
        let context = LogContext::new("test")
            .with_source("cloud")
            .with_device_instance(23)
            .with_field("serial", "SWABC".to_string());

        assert_eq!(context.component, "test");
        assert_eq!(context.source.as_deref(), Some("cloud"));
        assert_eq!(context.device_instance, Some(23));
        assert_eq!(
            context.extra_fields.get("serial"),
            Some(&"SWABC".to_string())
        );
    }

    #[test]
    fn formatted_fields_start_with_component() {
        let logger = get_logger_with_context(
            LogContext::new("driver")
                .with_source("modbus")
                .with_device_instance(23),
        );
        assert_eq!(
            logger.format_fields(),
            "component=driver,source=modbus,device_instance=23"
        );
    }

    #[test]
    fn test_structured_logger() {
        init_test_logging();
        let logger = get_logger("test_component");
        logger.info("Test info message");
        logger.debug("Test debug message");
        logger.warn("Test warning message");
        logger.error("Test error message");
        assert_eq!(logger.context.component, "test_component");
    }

    #[test]
    fn log_directory_uses_parent_of_file_path() {
        assert_eq!(log_directory("/var/log/helios.log"), Path::new("/var/log"));
        assert_eq!(log_directory("/var/log/helios"), Path::new("/var/log/helios"));
    }
}
