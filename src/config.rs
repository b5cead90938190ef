//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional in the file; omitted fields fall back to the
//! deployment defaults (interface `can0`, ignition sense on GPIO 27, gpsd at
//! `localhost:2947`, broadcast to `192.168.100.255:55283` every 100 ms).

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub ignition: IgnitionConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shm: ShmConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// CAN bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    /// Interface the raw socket binds to
    #[serde(default = "default_bus_interface")]
    pub interface: String,

    /// Bounded wait for bus readability per loop iteration
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Ignition sense input configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IgnitionConfig {
    /// GPIO pin wired to the switched power rail
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u32,

    /// sysfs GPIO root, overridable for tests
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
}

/// gpsd connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_host")]
    pub host: String,

    #[serde(default = "default_gps_port")]
    pub port: u16,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory receiving the binary ride logs (`YYYYMMDD_HHMMSS.dat`)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory receiving the text diagnostic log
    #[serde(default = "default_diag_dir")]
    pub diag_dir: String,
}

/// Shared telemetry buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ShmConfig {
    /// Backing file of the snapshot buffer, shared with the producer
    #[serde(default = "default_shm_path")]
    pub path: String,

    /// Number of record slots in the buffer
    #[serde(default = "default_shm_capacity")]
    pub capacity: usize,
}

/// Telemetry relay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Subnet broadcast address the datagrams are sent to
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,

    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// Snapshot/broadcast period
    #[serde(default = "default_relay_interval_ms")]
    pub interval_ms: u64,
}

// Default value functions
fn default_bus_interface() -> String { "can0".to_string() }
fn default_read_timeout_ms() -> u64 { 1000 }

fn default_gpio_pin() -> u32 { 27 }
fn default_gpio_root() -> String { "/sys/class/gpio".to_string() }

fn default_gps_host() -> String { "localhost".to_string() }
fn default_gps_port() -> u16 { 2947 }

fn default_data_dir() -> String { "./logs".to_string() }
fn default_diag_dir() -> String { "./logs".to_string() }

fn default_shm_path() -> String { "/dev/shm/ride-telemetry".to_string() }
fn default_shm_capacity() -> usize { 256 }

fn default_broadcast_addr() -> String { "192.168.100.255".to_string() }
fn default_relay_port() -> u16 { 55283 }
fn default_relay_interval_ms() -> u64 { 100 }

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: default_bus_interface(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for IgnitionConfig {
    fn default() -> Self {
        Self {
            gpio_pin: default_gpio_pin(),
            gpio_root: default_gpio_root(),
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            host: default_gps_host(),
            port: default_gps_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            diag_dir: default_diag_dir(),
        }
    }
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            path: default_shm_path(),
            capacity: default_shm_capacity(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broadcast_addr: default_broadcast_addr(),
            port: default_relay_port(),
            interval_ms: default_relay_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// A present-but-broken file is still an error; only a missing file is
    /// treated as "run with defaults".
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.bus.interface.is_empty() {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("bus interface cannot be empty"),
            ));
        }

        if self.bus.read_timeout_ms == 0 || self.bus.read_timeout_ms > 10000 {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("read_timeout_ms must be between 1 and 10000"),
            ));
        }

        if self.gps.host.is_empty() {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("gps host cannot be empty"),
            ));
        }

        if self.logging.data_dir.is_empty() {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("logging data_dir cannot be empty"),
            ));
        }

        if self.shm.capacity == 0 || self.shm.capacity > 4096 {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("shm capacity must be between 1 and 4096"),
            ));
        }

        if self.relay.broadcast_addr.parse::<Ipv4Addr>().is_err() {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("relay broadcast_addr must be an IPv4 address"),
            ));
        }

        if self.relay.interval_ms == 0 || self.relay.interval_ms > 60000 {
            return Err(crate::error::RideLoggerError::Config(
                toml::de::Error::custom("relay interval_ms must be between 1 and 60000"),
            ));
        }

        Ok(())
    }
}
