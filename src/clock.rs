//! # Session Clock
//!
//! Monotonic elapsed time since the start of the current ignition-on
//! session.
//!
//! Record timestamps must keep counting through NTP steps and DST changes,
//! so the clock is built on [`std::time::Instant`] and never consults the
//! wall clock. The wall clock is only used elsewhere, for naming log files.

use std::time::Instant;

/// Elapsed time split the way records store it
pub type Elapsed = (u32, u16);

/// Session-relative monotonic clock
///
/// The origin is set explicitly by [`reset`](SessionClock::reset) when a
/// session starts. If `elapsed` is called before any reset, the first
/// observed instant becomes the origin, so the first reading is (0, 0)
/// rather than garbage.
#[derive(Debug, Default)]
pub struct SessionClock {
    origin: Option<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart the clock at the current instant
    pub fn reset(&mut self) {
        self.origin = Some(Instant::now());
    }

    /// Time since the session origin as (whole seconds, millisecond remainder)
    ///
    /// Clock anomalies that would produce a negative delta clamp to zero.
    pub fn elapsed(&mut self) -> Elapsed {
        let now = Instant::now();
        let origin = *self.origin.get_or_insert(now);
        let delta = now.saturating_duration_since(origin);
        (delta.as_secs() as u32, delta.subsec_millis() as u16)
    }
}
