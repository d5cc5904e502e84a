//! Configuration management for Helios
//!
//! This module handles loading and validation of the application configuration
//! from YAML files. The configuration is read once at startup and treated as
//! immutable for the lifetime of the process.

use crate::error::{HeliosError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Placeholder substituted by each configured phase label in path templates
pub const PHASE_PLACEHOLDER: &str = "[*Phase*]";

/// Lower bound for the cloud fetch interval; the SolaX Cloud refreshes its
/// realtime data at most this often
pub const MIN_CLOUD_FETCH_INTERVAL_SECS: u64 = 15;

/// Highest field-bus phase number; SolaX only maps the R, S and T blocks
pub const MAX_FIELD_BUS_PHASES: usize = 3;

/// Field-bus phase number of a `phase<N>` key (N >= 1)
pub fn phase_number(key: &str) -> Option<usize> {
    let digits = key.strip_prefix("phase")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok().filter(|n| *n >= 1)
}

/// Phase labels become D-Bus path segments
fn is_valid_phase_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Telemetry source, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// SolaX Cloud HTTP API
    Cloud,
    /// Local Modbus RTU over RS-485
    Modbus,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cloud => "cloud",
            SourceKind::Modbus => "modbus",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active telemetry source
    pub source: SourceKind,

    /// Inverter identity, position and electrical limits
    pub inverter: InverterConfig,

    /// Ordered mapping of phase keys (`phase1`, `phase2`, ...) to labels (`L1`, ...)
    pub phases: IndexMap<String, String>,

    /// SolaX Cloud API credentials
    pub cloud: CloudConfig,

    /// Modbus RTU connection parameters
    pub modbus: ModbusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Tick period in milliseconds
    pub poll_interval_ms: u64,

    /// Interval of the sign-of-life log in minutes (0 disables it)
    pub sign_of_life_minutes: u64,
}

/// Inverter identity and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// Device instance for the D-Bus service (pvinverters use 20..29)
    pub device_instance: u32,

    /// Position on the system: 0 = AC input 1, 1 = AC output, 2 = AC input 2
    pub position: u8,

    /// Maximum AC power in W
    pub max_power: f64,

    /// Nominal grid voltage in V, used to derive current from cloud power
    pub grid_voltage: f64,

    /// Optional serial override; otherwise read from the active source
    pub serial: Option<String>,

    /// Product and custom name shown on the bus
    pub product_name: String,
}

/// SolaX Cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Realtime info endpoint
    pub endpoint: String,

    /// API token id
    pub token_id: String,

    /// Registration number of the WiFi/LAN dongle
    pub registration_number: String,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,

    /// Minimum seconds between two cloud fetches
    pub min_fetch_interval_seconds: u64,
}

/// Modbus RTU connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Serial device path of the RS-485 adapter
    pub port: String,

    /// Baud rate (SolaX uses 9600 8N1 by default)
    pub baud_rate: u32,

    /// Modbus slave id of the inverter
    pub slave_id: u8,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Upper bound for tracker discovery
    pub max_trackers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None::<&Path>)
    }

    /// Load configuration from an explicit path, or the first default location
    /// that exists, and validate it
    pub fn load_from<P: AsRef<Path>>(explicit: Option<P>) -> Result<Self> {
        let config = if let Some(path) = explicit {
            Self::from_file(path)?
        } else {
            let default_paths = [
                "helios_config.yaml",
                "/data/helios_config.yaml",
                "/etc/helios/config.yaml",
            ];
            match default_paths.iter().find(|p| Path::new(p).exists()) {
                Some(path) => Self::from_file(path)?,
                None => Config::default(),
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Phase labels in configured order
    pub fn phase_labels(&self) -> Vec<String> {
        self.phases.values().cloned().collect()
    }

    /// Field-bus phase numbers parsed from the `phase<N>` keys, in configured
    /// order; index i is the phase published under `phase_labels()[i]`
    pub fn phase_numbers(&self) -> Vec<usize> {
        self.phases.keys().filter_map(|k| phase_number(k)).collect()
    }

    /// Human readable description of the active connection for `/Mgmt/Connection`
    pub fn connection_string(&self) -> String {
        match self.source {
            SourceKind::Cloud => format!("SolaX Cloud {}", self.cloud.endpoint),
            SourceKind::Modbus => format!(
                "Modbus RTU {} @ {} baud (slave {})",
                self.modbus.port, self.modbus.baud_rate, self.modbus.slave_id
            ),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_phases()?;

        match self.source {
            SourceKind::Cloud => {
                if self.cloud.endpoint.trim().is_empty() {
                    return Err(HeliosError::config("SolaX Cloud endpoint is not set/empty"));
                }
                if self.cloud.token_id.trim().is_empty() {
                    return Err(HeliosError::config("SolaX Cloud tokenId is not set/empty"));
                }
                if self.cloud.registration_number.trim().is_empty() {
                    return Err(HeliosError::config("SolaX Cloud regNo is not set/empty"));
                }
                if self.phases.len() != 1 {
                    return Err(HeliosError::validation(
                        "phases",
                        "The cloud source reports a single phase; configure exactly one",
                    ));
                }
            }
            SourceKind::Modbus => {
                if self.modbus.port.trim().is_empty() {
                    return Err(HeliosError::validation(
                        "modbus.port",
                        "Serial port cannot be empty",
                    ));
                }
                if self.modbus.baud_rate == 0 {
                    return Err(HeliosError::validation(
                        "modbus.baud_rate",
                        "Must be greater than 0",
                    ));
                }
                if self.modbus.max_trackers == 0 {
                    return Err(HeliosError::validation(
                        "modbus.max_trackers",
                        "Must be at least 1",
                    ));
                }
            }
        }

        if self.cloud.min_fetch_interval_seconds < MIN_CLOUD_FETCH_INTERVAL_SECS {
            return Err(HeliosError::validation(
                "cloud.min_fetch_interval_seconds",
                "Must be at least 15 seconds",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(HeliosError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if !self.inverter.grid_voltage.is_finite() || self.inverter.grid_voltage < 0.0 {
            return Err(HeliosError::validation(
                "inverter.grid_voltage",
                "Must be a non-negative number",
            ));
        }

        Ok(())
    }

    fn validate_phases(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(HeliosError::config("At least one phase must be configured"));
        }
        let mut seen_numbers: Vec<usize> = Vec::with_capacity(self.phases.len());
        let mut seen_labels: Vec<&str> = Vec::with_capacity(self.phases.len());
        for (key, label) in &self.phases {
            let Some(number) = phase_number(key) else {
                return Err(HeliosError::config(format!(
                    "Malformed phase key '{}'; expected 'phase<N>'",
                    key
                )));
            };
            if seen_numbers.contains(&number) {
                return Err(HeliosError::config(format!(
                    "Phase {} is configured more than once",
                    number
                )));
            }
            if self.source == SourceKind::Modbus && number > MAX_FIELD_BUS_PHASES {
                return Err(HeliosError::config(format!(
                    "Phase key '{}' exceeds the {} field-bus phases",
                    key, MAX_FIELD_BUS_PHASES
                )));
            }
            if !is_valid_phase_label(label) {
                return Err(HeliosError::config(format!(
                    "Malformed phase label '{}' for '{}'; use letters, digits or '_'",
                    label, key
                )));
            }
            if seen_labels.contains(&label.as_str()) {
                return Err(HeliosError::config(format!(
                    "Phase label '{}' is configured more than once",
                    label
                )));
            }
            seen_numbers.push(number);
            seen_labels.push(label);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_config() -> Config {
        let mut config = Config::default();
        config.cloud.token_id = "token".to_string();
        config.cloud.registration_number = "SWABCDEFGH".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source, SourceKind::Cloud);
        assert_eq!(config.inverter.device_instance, 23);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.phase_labels(), vec!["L1".to_string()]);
    }

    #[test]
    fn test_config_validation() {
        let config = cloud_config();
        assert!(config.validate().is_ok());

        // Default config has no credentials
        assert!(Config::default().validate().is_err());

        let mut config = cloud_config();
        config.cloud.endpoint.clear();
        assert!(matches!(
            config.validate(),
            Err(HeliosError::Config { .. })
        ));

        let mut config = cloud_config();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn modbus_source_does_not_need_cloud_credentials() {
        let mut config = Config::default();
        config.source = SourceKind::Modbus;
        config.phases.insert("phase2".to_string(), "L2".to_string());
        config.phases.insert("phase3".to_string(), "L3".to_string());
        assert!(config.validate().is_ok());

        config.modbus.port.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_or_malformed_phase_labels_are_rejected() {
        let mut config = Config::default();
        config.source = SourceKind::Modbus;
        config.phases.insert("phase2".to_string(), "L1".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source = SourceKind::Modbus;
        config.phases.insert("phase2".to_string(), "L2/x".to_string());
        assert!(config.validate().is_err());
    }

    fn modbus_with(phases: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        config.source = SourceKind::Modbus;
        config.phases = phases
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config
    }

    #[test]
    fn phase_keys_parse_to_field_bus_numbers() {
        assert_eq!(phase_number("phase1"), Some(1));
        assert_eq!(phase_number("phase12"), Some(12));
        assert_eq!(phase_number("phase0"), None);
        assert_eq!(phase_number("phase"), None);
        assert_eq!(phase_number("phase+1"), None);
        assert_eq!(phase_number("banana"), None);

        let config = modbus_with(&[("phase2", "L2"), ("phase1", "L1")]);
        assert!(config.validate().is_ok());
        assert_eq!(config.phase_numbers(), vec![2, 1]);
        assert_eq!(config.phase_labels(), vec!["L2", "L1"]);
    }

    #[test]
    fn malformed_phase_keys_are_rejected() {
        for phases in [
            vec![("banana", "L1")],
            vec![("phase0", "L1")],
            vec![("phase1", "L1"), ("phase01", "L2")],
        ] {
            let err = modbus_with(&phases).validate().unwrap_err();
            assert!(matches!(err, HeliosError::Config { .. }), "{:?}", phases);
        }
    }

    #[test]
    fn labels_must_be_path_segments() {
        for label in [" L1", "L1 ", "L 1", "", "L1/x", "[*Phase*]", "L-1"] {
            let err = modbus_with(&[("phase1", label)]).validate().unwrap_err();
            assert!(matches!(err, HeliosError::Config { .. }), "{:?}", label);
        }
        assert!(modbus_with(&[("phase1", "Phase_A1")]).validate().is_ok());
    }

    #[test]
    fn field_bus_supports_three_phases() {
        let config = modbus_with(&[("phase1", "L1"), ("phase4", "L4")]);
        assert!(matches!(
            config.validate(),
            Err(HeliosError::Config { .. })
        ));
        let config = modbus_with(&[("phase3", "L3")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cloud_interval_below_floor_is_rejected() {
        let mut config = cloud_config();
        config.cloud.min_fetch_interval_seconds = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = cloud_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.cloud.token_id, deserialized.cloud.token_id);
        assert_eq!(config.phase_labels(), deserialized.phase_labels());
    }

    #[test]
    fn phase_order_follows_the_file() {
        let yaml = r#"
source: modbus
phases:
  phase1: L3
  phase2: L1
  phase3: L2
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.phase_labels(), vec!["L3", "L1", "L2"]);
        assert_eq!(config.modbus.baud_rate, 9600);
    }
}
