use crate::error::{HeliosError, Result};
use tracing::Level;

/// Parse a configured level name (case-insensitive)
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        _ => Err(HeliosError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}

pub fn level_rank(level: Level) -> u8 {
    match level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

/// The more verbose of two levels
pub fn min_level(a: Level, b: Level) -> Level {
    if level_rank(a) <= level_rank(b) { a } else { b }
}

/// Resolve an optional per-layer level, falling back to the base level
pub fn layer_level(specific: Option<&String>, base: Level) -> Level {
    specific
        .and_then(|s| parse_log_level(s).ok())
        .unwrap_or(base)
}
