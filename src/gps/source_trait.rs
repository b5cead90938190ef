//! Trait abstraction for the GPS service connection to enable testing

use async_trait::async_trait;

use crate::error::Result;
use crate::gps::GpsFixSnapshot;

/// Connection to a fix-producing GPS service
///
/// The acquisition loop connects at session start (fatal on failure),
/// retries every iteration while disconnected (non-fatal) and drains
/// pending fixes without blocking.
#[async_trait]
pub trait GpsSource: Send {
    /// Establish the connection and enable streaming updates
    async fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Drain pending updates without blocking; the newest fix wins
    fn poll_fix(&mut self) -> Option<GpsFixSnapshot>;

    /// Disable streaming and drop the connection
    async fn disconnect(&mut self);
}
