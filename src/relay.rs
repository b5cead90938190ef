//! # Telemetry Relay
//!
//! Broadcasts the latest telemetry snapshot to the local network.
//!
//! Runs as its own process beside the logger. Every period it copies the
//! shared buffer, cuts it at the first sentinel slot and sends the valid
//! prefix byte-for-byte as one UDP datagram to the subnet broadcast
//! address. Delivery is fire-and-forget: no acknowledgment, no retry.
//! Dashboards on the local network just listen for the datagrams.

use bytes::BytesMut;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::interval;
use tracing::{debug, info, warn};

use serde::de::Error;

use crate::config::Config;
use crate::error::{Result, RideLoggerError};
use crate::record::{TelemetryRecord, RECORD_SIZE};
use crate::shm::{valid_prefix_len, SnapshotReader};

/// Concatenate the valid prefix of one snapshot into a datagram
///
/// Returns `None` when the first slot is already the sentinel; an empty
/// datagram is never sent.
pub fn assemble_datagram(records: &[TelemetryRecord]) -> Option<BytesMut> {
    let count = valid_prefix_len(records);
    if count == 0 {
        return None;
    }

    let mut buf = BytesMut::with_capacity(count * RECORD_SIZE);
    for record in &records[..count] {
        record.write_to(&mut buf);
    }
    Some(buf)
}

/// Periodic snapshot-and-broadcast driver
pub struct Relay {
    reader: SnapshotReader,
    socket: UdpSocket,
    target: SocketAddr,
    period: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Relay {
    /// Open the shared buffer and a broadcast-enabled UDP socket
    pub async fn new(config: &Config, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let reader = SnapshotReader::open(Path::new(&config.shm.path), config.shm.capacity)?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let addr: Ipv4Addr = config.relay.broadcast_addr.parse().map_err(|_| {
            RideLoggerError::Config(toml::de::Error::custom(
                "relay broadcast_addr must be an IPv4 address",
            ))
        })?;

        Ok(Self {
            reader,
            socket,
            target: SocketAddr::from((addr, config.relay.port)),
            period: Duration::from_millis(config.relay.interval_ms),
            shutdown,
        })
    }

    /// Snapshot and broadcast once per period until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!("relaying telemetry to {} every {:?}", self.target, self.period);

        let mut ticker = interval(self.period);
        while !self.shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            self.broadcast_once().await;
        }

        info!("relay stopped");
        Ok(())
    }

    async fn broadcast_once(&mut self) {
        let records = match self.reader.snapshot() {
            Ok(records) => records,
            Err(e) => {
                // lossy by design; the next cycle gets a fresh chance
                warn!("skipping relay cycle: {}", e);
                return;
            }
        };

        let Some(datagram) = assemble_datagram(&records) else {
            return;
        };

        match self.socket.send_to(&datagram, self.target).await {
            Ok(sent) => debug!("broadcast {} telemetry bytes", sent),
            Err(e) => warn!("failed to send telemetry datagram: {}", e),
        }
    }
}
