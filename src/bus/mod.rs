//! # CAN Bus Module
//!
//! Raw SocketCAN access for the acquisition loop.
//!
//! This module handles:
//! - Opening a raw socket bound to a named interface (e.g. `can0`)
//! - One bounded-wait read per loop iteration
//! - Mapping bus frames into [`BusFrame`] values for the capture path

use async_trait::async_trait;
use socketcan::tokio::CanSocket;
use socketcan::{CanFrame, EmbeddedFrame, Frame};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, RideLoggerError};

pub mod source_trait;

pub use source_trait::{BusFrame, FrameSource};

/// Raw SocketCAN frame source
#[derive(Debug)]
pub struct SocketCanBus {
    socket: CanSocket,
    interface: String,
}

impl SocketCanBus {
    /// Open a raw socket bound to the named interface
    ///
    /// # Errors
    ///
    /// Returns error if the interface does not exist or the socket cannot
    /// be created or bound; both are fatal at startup.
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface)
            .map_err(|e| RideLoggerError::Bus(format!("failed to open {}: {}", interface, e)))?;

        info!("bus socket bound to {}", interface);
        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }

    /// Name of the interface the socket is bound to
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait]
impl FrameSource for SocketCanBus {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<BusFrame>> {
        match tokio::time::timeout(timeout, self.socket.read_frame()).await {
            // quiet bus this iteration
            Err(_) => Ok(None),
            Ok(Ok(frame)) => Ok(Some(to_bus_frame(&frame))),
            Ok(Err(e)) => Err(RideLoggerError::Bus(format!(
                "wait on {} failed: {}",
                self.interface, e
            ))),
        }
    }
}

fn to_bus_frame(frame: &CanFrame) -> BusFrame {
    BusFrame::new(frame.raw_id(), frame.data())
}
