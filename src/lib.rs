//! # Helios - SolaX PV Inverter Driver for Victron Venus OS
//!
//! Reads telemetry from a SolaX inverter, either through the SolaX Cloud API
//! or directly over Modbus RTU, and publishes it on the Venus OS D-Bus as a
//! `com.victronenergy.pvinverter` service.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, defaults and validation
//! - `logging`: Structured logging and tracing
//! - `cloud`: SolaX Cloud HTTP/JSON client
//! - `modbus`: Modbus RTU client and register map
//! - `status`: Canonical inverter status and source code mappings
//! - `topology`: Phase-templated D-Bus path set
//! - `driver`: Normalization engine and main loop
//! - `dbus`: D-Bus integration for Venus OS

pub mod cloud;
pub mod config;
pub mod dbus;
pub mod driver;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod status;
pub mod topology;

// Re-export commonly used types
pub use config::Config;
pub use driver::InverterDriver;
pub use error::{HeliosError, Result};
