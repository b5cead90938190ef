//! # GPS Module
//!
//! Turns gpsd fix updates into telemetry records.
//!
//! This module handles:
//! - Quality-gating fixes (status, mode, NaN coordinates)
//! - Fixed-point encoding of position, altitude and speed
//! - Deduplicating consecutive fixes at the same encoded position
//! - The gpsd TCP client behind the [`GpsSource`] trait
//!
//! An accepted fix becomes two records sharing one timestamp: one under
//! [`GPS_POS_ID`](crate::record::GPS_POS_ID) carrying longitude/latitude
//! and one under [`GPS_ALT_SPD_ID`](crate::record::GPS_ALT_SPD_ID)
//! carrying altitude/speed.

pub mod gpsd;
pub mod source_trait;

pub use gpsd::GpsdClient;
pub use source_trait::GpsSource;

/// Fix-quality status as reported by gpsd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStatus {
    NoFix,
    Fix,
    /// Differential fix; newer gpsd versions report this for ordinary
    /// receivers, so it must be accepted alongside `Fix`
    DgpsFix,
}

impl FixStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => FixStatus::Fix,
            2 => FixStatus::DgpsFix,
            _ => FixStatus::NoFix,
        }
    }
}

/// Fix dimensionality as reported by gpsd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    Unknown,
    NoFix,
    TwoD,
    ThreeD,
}

impl FixMode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => FixMode::NoFix,
            2 => FixMode::TwoD,
            3 => FixMode::ThreeD,
            _ => FixMode::Unknown,
        }
    }
}

/// One fix update, transient between poll and encode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFixSnapshot {
    pub status: FixStatus,
    pub mode: FixMode,
    /// Degrees, NaN when the receiver did not report a coordinate
    pub latitude: f64,
    pub longitude: f64,
    /// Meters, 0.0 when not reported
    pub altitude: f64,
    /// Meters per second, 0.0 when not reported
    pub speed: f64,
}

impl GpsFixSnapshot {
    /// Quality gate: a usable fix has a real position solution
    pub fn is_usable(&self) -> bool {
        matches!(self.status, FixStatus::Fix | FixStatus::DgpsFix)
            && matches!(self.mode, FixMode::TwoD | FixMode::ThreeD)
            && !self.latitude.is_nan()
            && !self.longitude.is_nan()
    }
}

/// Fixed-point scale for all encoded GPS quantities
pub const FIX_SCALE: f64 = 1_000_000.0;

/// Offset keeping encoded longitude non-negative over [-180, 180]
pub const LON_OFFSET: i32 = 180_000_000;

/// Offset keeping encoded latitude non-negative over [-90, 90]
pub const LAT_OFFSET: i32 = 90_000_000;

/// Offset keeping encoded altitude non-negative down to -1000 m
pub const ALT_OFFSET: i32 = 1_000_000_000;

/// A fix scaled to the i32 fixed-point form the records carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFix {
    pub lon: i32,
    pub lat: i32,
    pub alt: i32,
    pub speed: i32,
}

impl EncodedFix {
    pub fn from_fix(fix: &GpsFixSnapshot) -> Self {
        Self {
            lon: (fix.longitude * FIX_SCALE).round() as i32 + LON_OFFSET,
            lat: (fix.latitude * FIX_SCALE).round() as i32 + LAT_OFFSET,
            alt: (fix.altitude * FIX_SCALE).round() as i32 + ALT_OFFSET,
            speed: (fix.speed * FIX_SCALE).round() as i32,
        }
    }

    /// Payload of the position record: longitude then latitude, little-endian
    pub fn position_payload(&self) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&self.lon.to_le_bytes());
        payload[4..].copy_from_slice(&self.lat.to_le_bytes());
        payload
    }

    /// Payload of the motion record: altitude then speed, little-endian
    pub fn motion_payload(&self) -> [u8; 8] {
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&self.alt.to_le_bytes());
        payload[4..].copy_from_slice(&self.speed.to_le_bytes());
        payload
    }
}

/// Reverse the fixed-point encoding of one quantity
pub fn decode_quantity(raw: i32, offset: i32) -> f64 {
    (raw - offset) as f64 / FIX_SCALE
}

/// Position deduplication across fixes
///
/// gpsd repeats its last solution while the receiver is stationary or
/// between satellite updates; logging every repeat would bloat the ride
/// log with no information. The dedup key is the *encoded* position, so
/// sub-microdegree jitter also collapses. State intentionally outlives
/// sessions: it belongs to the acquisition loop, not the log file.
#[derive(Debug, Default)]
pub struct FixEncoder {
    last_position: Option<(i32, i32)>,
}

impl FixEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a usable fix, or `None` when it repeats the previous position
    pub fn encode(&mut self, fix: &GpsFixSnapshot) -> Option<EncodedFix> {
        let encoded = EncodedFix::from_fix(fix);

        if self.last_position == Some((encoded.lon, encoded.lat)) {
            return None;
        }

        self.last_position = Some((encoded.lon, encoded.lat));
        Some(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(longitude: f64, latitude: f64) -> GpsFixSnapshot {
        GpsFixSnapshot {
            status: FixStatus::Fix,
            mode: FixMode::ThreeD,
            latitude,
            longitude,
            altitude: 12.5,
            speed: 3.25,
        }
    }

    #[test]
    fn test_known_encoding_values() {
        // San Francisco area reference point
        let encoded = EncodedFix::from_fix(&fix(-122.0, 37.0));
        assert_eq!(encoded.lon, 58_000_000);
        assert_eq!(encoded.lat, 127_000_000);
    }

    #[test]
    fn test_decode_reverses_encoding_exactly() {
        let encoded = EncodedFix::from_fix(&fix(-122.0, 37.0));
        assert_eq!(decode_quantity(encoded.lon, LON_OFFSET), -122.0);
        assert_eq!(decode_quantity(encoded.lat, LAT_OFFSET), 37.0);
        assert_eq!(decode_quantity(encoded.alt, ALT_OFFSET), 12.5);
        assert_eq!(decode_quantity(encoded.speed, 0), 3.25);
    }

    #[test]
    fn test_position_payload_is_little_endian() {
        let encoded = EncodedFix {
            lon: 0x0102_0304,
            lat: 0x0506_0708,
            alt: 0,
            speed: 0,
        };
        assert_eq!(
            encoded.position_payload(),
            [0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05]
        );
    }

    #[test]
    fn test_usability_gate() {
        assert!(fix(-122.0, 37.0).is_usable());

        let mut no_status = fix(-122.0, 37.0);
        no_status.status = FixStatus::NoFix;
        assert!(!no_status.is_usable());

        let mut bad_mode = fix(-122.0, 37.0);
        bad_mode.mode = FixMode::NoFix;
        assert!(!bad_mode.is_usable());

        // NaN latitude is rejected regardless of status and mode
        assert!(!fix(-122.0, f64::NAN).is_usable());
        assert!(!fix(f64::NAN, 37.0).is_usable());
    }

    #[test]
    fn test_dgps_and_2d_are_accepted() {
        let mut dgps = fix(10.0, 50.0);
        dgps.status = FixStatus::DgpsFix;
        dgps.mode = FixMode::TwoD;
        assert!(dgps.is_usable());
    }

    #[test]
    fn test_encoder_drops_repeated_position() {
        let mut encoder = FixEncoder::new();
        assert!(encoder.encode(&fix(-122.0, 37.0)).is_some());
        assert!(encoder.encode(&fix(-122.0, 37.0)).is_none(), "repeat must be dropped");
        assert!(encoder.encode(&fix(-122.0001, 37.0)).is_some());
    }

    #[test]
    fn test_encoder_dedups_on_encoded_position_only() {
        let mut encoder = FixEncoder::new();

        let mut first = fix(-122.0, 37.0);
        first.speed = 1.0;
        assert!(encoder.encode(&first).is_some());

        // same position with different speed is still a repeat
        let mut second = fix(-122.0, 37.0);
        second.speed = 9.0;
        assert!(encoder.encode(&second).is_none());
    }

    #[test]
    fn test_status_and_mode_from_raw() {
        assert_eq!(FixStatus::from_raw(1), FixStatus::Fix);
        assert_eq!(FixStatus::from_raw(2), FixStatus::DgpsFix);
        assert_eq!(FixStatus::from_raw(0), FixStatus::NoFix);
        assert_eq!(FixMode::from_raw(2), FixMode::TwoD);
        assert_eq!(FixMode::from_raw(3), FixMode::ThreeD);
        assert_eq!(FixMode::from_raw(0), FixMode::Unknown);
    }
}
