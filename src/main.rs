//! # Ride Logger
//!
//! Ignition-gated vehicle telemetry acquisition daemon.
//!
//! Waits for the ignition signal, then captures CAN frames and GPS fixes
//! into a per-session binary log until the key turns off again.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use ride_logger::acquisition::Acquisition;
use ride_logger::bus::SocketCanBus;
use ride_logger::config::Config;
use ride_logger::diag;
use ride_logger::gps::GpsdClient;
use ride_logger::ignition::SysfsGpioInput;
use ride_logger::shutdown::shutdown_flag;

/// Config file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the acquisition daemon
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (argv\[1\] or the default path, built-in
///      defaults when the file is absent)
///    - Set up best-effort file diagnostics
///    - Open the bus socket and the ignition sense pin (fatal on failure)
///    - Install the cooperative shutdown flag
///
/// 2. **Main Loop**
///    - One acquisition iteration per cycle: ignition sampling and
///      session lifecycle, bounded bus wait, GPS polling
///
/// 3. **Shutdown**
///    - On SIGTERM/SIGINT/SIGHUP or a fatal condition, close any open
///      session (log rename, GPS disconnect) and exit
///
/// # Errors
///
/// Returns error if the bus socket or GPIO pin cannot be opened, or the
/// loop hits a fatal runtime condition; the process then exits non-zero.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    let _diag_guard = diag::init(Path::new(&config.logging.diag_dir), "ride-logger.log");

    info!("ride-logger v{} starting...", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.logging.data_dir)?;

    let bus = SocketCanBus::open(&config.bus.interface)?;
    let input = SysfsGpioInput::open(
        Path::new(&config.ignition.gpio_root),
        config.ignition.gpio_pin,
    )?;
    let gps = GpsdClient::new(config.gps.host.clone(), config.gps.port);

    let shutdown = shutdown_flag()?;
    let mut acquisition = Acquisition::new(&config, input, bus, gps, shutdown);
    acquisition.run().await?;

    info!("clean shutdown");
    Ok(())
}
