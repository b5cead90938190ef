//! # Error Types
//!
//! Custom error types for the ride logger using `thiserror`.

use thiserror::Error;

/// Main error type for the ride logger and relay
#[derive(Debug, Error)]
pub enum RideLoggerError {
    /// CAN bus socket errors (open, bind, bounded wait)
    #[error("bus error: {0}")]
    Bus(String),

    /// GPIO ignition-sense errors
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// gpsd connection and protocol errors
    #[error("GPS error: {0}")]
    Gps(String),

    /// Shared telemetry buffer errors
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the ride logger
pub type Result<T> = std::result::Result<T, RideLoggerError>;
