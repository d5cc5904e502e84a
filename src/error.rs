//! Error types and handling for Helios
//!
//! This module defines the error types used throughout the application.
//! Connection, protocol and device errors are tick-scoped: the engine logs
//! them and retries on the next tick. Configuration errors raised during
//! startup are fatal.

use thiserror::Error;

/// Result type alias for Helios operations
pub type Result<T> = std::result::Result<T, HeliosError>;

/// Main error type for Helios
#[derive(Debug, Error)]
pub enum HeliosError {
    /// Missing or malformed configuration (empty credentials, bad phase map)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Telemetry source unreachable (no HTTP response, serial port gone)
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Malformed payload or explicit failure flag from the cloud API
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Field-bus read failure or invalid tracker discovery
    #[error("Device error: {message}")]
    Device { message: String },

    /// D-Bus communication errors
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },
}

impl HeliosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeliosError::Config {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        HeliosError::Connection {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        HeliosError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new field-bus device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        HeliosError::Device {
            message: message.into(),
        }
    }

    /// Create a new D-Bus error
    pub fn dbus<S: Into<String>>(message: S) -> Self {
        HeliosError::DBus {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HeliosError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeliosError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        HeliosError::Timeout {
            message: message.into(),
        }
    }

    /// Whether the error only aborts the current tick and is retried on the next one
    pub fn is_tick_scoped(&self) -> bool {
        matches!(
            self,
            HeliosError::Connection { .. }
                | HeliosError::Protocol { .. }
                | HeliosError::Device { .. }
                | HeliosError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for HeliosError {
    fn from(err: std::io::Error) -> Self {
        HeliosError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliosError {
    fn from(err: serde_yaml::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliosError {
    fn from(err: serde_json::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}
