//! # Telemetry Record Codec
//!
//! Defines the fixed-size binary record shared by the logger, the relay and
//! the shared telemetry buffer.
//!
//! Every sample, whether a captured CAN frame or a GPS-derived
//! pseudo-frame, is stored, transmitted and exchanged as one 16-byte
//! `TelemetryRecord`:
//! session-relative timestamp, bus identifier and 8 payload bytes. Log files
//! and UDP datagrams are plain concatenations of these records with no
//! header. All multi-byte fields are serialized little-endian.

use bytes::{BufMut, BytesMut};

/// Serialized size of one record in bytes
pub const RECORD_SIZE: usize = 16;

/// Virtual bus identifier for GPS longitude/latitude records (0x7FF)
///
/// Sits above the 11-bit identifiers (0-2045) used on the vehicle bus, so
/// GPS pseudo-frames never collide with a real frame in the same log.
pub const GPS_POS_ID: u16 = 2047;

/// Virtual bus identifier for GPS altitude/speed records (0x7FE)
pub const GPS_ALT_SPD_ID: u16 = 2046;

/// One telemetry sample with a session-relative timestamp
///
/// `elapsed_seconds`/`elapsed_millis` count from the start of the current
/// ignition-on session. `id` is either a real bus identifier or one of the
/// reserved GPS identifiers. The payload is always carried in full; short
/// CAN frames do not zero their trailing bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryRecord {
    /// Whole seconds since session start
    pub elapsed_seconds: u32,
    /// Millisecond remainder (0-999)
    pub elapsed_millis: u16,
    /// Bus identifier or reserved GPS identifier
    pub id: u16,
    /// Raw 8-byte payload
    pub payload: [u8; 8],
}

impl TelemetryRecord {
    /// Create a record from its fields
    pub fn new(elapsed_seconds: u32, elapsed_millis: u16, id: u16, payload: [u8; 8]) -> Self {
        Self {
            elapsed_seconds,
            elapsed_millis,
            id,
            payload,
        }
    }

    /// Serialize to the 16-byte wire/storage layout (little-endian)
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..4].copy_from_slice(&self.elapsed_seconds.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.elapsed_millis.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.id.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.payload);
        bytes
    }

    /// Deserialize from the 16-byte wire/storage layout
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&bytes[8..16]);
        Self {
            elapsed_seconds: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            elapsed_millis: u16::from_le_bytes([bytes[4], bytes[5]]),
            id: u16::from_le_bytes([bytes[6], bytes[7]]),
            payload,
        }
    }

    /// Append the serialized record to a datagram buffer
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_bytes());
    }

    /// True when this slot terminates the valid prefix of a snapshot buffer
    ///
    /// A slot with both elapsed fields zero means "no more valid data".
    /// Records written in the very first millisecond of a session also
    /// match; the buffer discipline inherits that ambiguity.
    pub fn is_sentinel(&self) -> bool {
        self.elapsed_seconds == 0 && self.elapsed_millis == 0
    }
}
