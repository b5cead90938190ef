//! # Ride Relay
//!
//! Broadcasts the latest telemetry snapshot to the local network.
//!
//! Runs beside `ride-logger` as an independent process. Every configured
//! interval it snapshots the shared telemetry buffer and sends the valid
//! records as one UDP datagram to the subnet broadcast address, so any
//! dashboard on the network can follow the ride live.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use ride_logger::config::Config;
use ride_logger::diag;
use ride_logger::relay::Relay;
use ride_logger::shutdown::shutdown_flag;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    let _diag_guard = diag::init(Path::new(&config.logging.diag_dir), "ride-relay.log");

    info!("ride-relay v{} starting...", env!("CARGO_PKG_VERSION"));

    let shutdown = shutdown_flag()?;
    let mut relay = Relay::new(&config, shutdown).await?;
    relay.run().await?;

    info!("clean shutdown");
    Ok(())
}
