//! # Shared Telemetry Buffer
//!
//! Sequence-locked snapshot buffer exchanged between the telemetry
//! producer and the relay through a shared-memory file.
//!
//! Layout: an 8-byte header (u32 little-endian sequence number, 4 reserved
//! bytes) followed by a fixed number of 16-byte record slots. The valid
//! records form a prefix terminated by an all-zero sentinel slot.
//!
//! Writer discipline: bump the sequence to an odd value, write the slots,
//! bump it back to even. Reader discipline: read the sequence, copy the
//! slots, read the sequence again; accept the copy only if the sequence
//! was even and unchanged. The producer and relay are separate processes,
//! so this is the only coordination between them.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{Result, RideLoggerError};
use crate::record::{TelemetryRecord, RECORD_SIZE};

/// Bytes before the first record slot
pub const HEADER_SIZE: usize = 8;

/// Consistent-read attempts before a snapshot is reported torn
const SNAPSHOT_RETRIES: usize = 8;

fn buffer_len(capacity: usize) -> u64 {
    (HEADER_SIZE + capacity * RECORD_SIZE) as u64
}

fn open_buffer_file(path: &Path, capacity: usize) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| {
            RideLoggerError::SharedMemory(format!("failed to open {}: {}", path.display(), e))
        })?;

    // grow a fresh file to its full slot array; never shrink an existing one
    if file.metadata()?.len() < buffer_len(capacity) {
        file.set_len(buffer_len(capacity))?;
    }

    Ok(file)
}

fn read_sequence(file: &File) -> Result<u32> {
    let mut bytes = [0u8; 4];
    file.read_exact_at(&mut bytes, 0)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Length of the valid record prefix of one snapshot
pub fn valid_prefix_len(records: &[TelemetryRecord]) -> usize {
    records
        .iter()
        .position(TelemetryRecord::is_sentinel)
        .unwrap_or(records.len())
}

/// Producer half of the buffer
///
/// The logger process never writes the buffer; this half exists for the
/// external telemetry producer and for tests.
pub struct SnapshotWriter {
    file: File,
    capacity: usize,
    sequence: u32,
}

impl SnapshotWriter {
    /// Create or reuse the buffer file and reset it to an empty state
    pub fn create(path: &Path, capacity: usize) -> Result<Self> {
        let file = open_buffer_file(path, capacity)?;
        let mut writer = Self {
            file,
            capacity,
            sequence: 0,
        };
        writer.publish(&[])?;
        Ok(writer)
    }

    fn write_sequence(&self) -> Result<()> {
        self.file.write_all_at(&self.sequence.to_le_bytes(), 0)?;
        Ok(())
    }

    /// Replace the buffer contents with a new valid prefix
    ///
    /// At most `capacity` records are written; a terminating sentinel slot
    /// follows whenever there is room for one.
    pub fn publish(&mut self, records: &[TelemetryRecord]) -> Result<()> {
        let count = records.len().min(self.capacity);

        self.sequence = self.sequence.wrapping_add(1);
        self.write_sequence()?;

        let mut offset = HEADER_SIZE as u64;
        for record in &records[..count] {
            self.file.write_all_at(&record.to_bytes(), offset)?;
            offset += RECORD_SIZE as u64;
        }
        if count < self.capacity {
            self.file
                .write_all_at(&TelemetryRecord::default().to_bytes(), offset)?;
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.write_sequence()?;
        Ok(())
    }
}

/// Relay half of the buffer
pub struct SnapshotReader {
    file: File,
    capacity: usize,
}

impl SnapshotReader {
    /// Open the buffer file, creating it empty if the producer has not yet
    ///
    /// Either process may start first; a freshly created file reads as an
    /// all-sentinel buffer.
    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        let file = open_buffer_file(path, capacity)?;
        Ok(Self { file, capacity })
    }

    /// Copy a consistent view of all record slots
    ///
    /// # Errors
    ///
    /// Returns a `SharedMemory` error when every attempt raced a writer;
    /// the relay logs it and skips that cycle.
    pub fn snapshot(&self) -> Result<Vec<TelemetryRecord>> {
        let mut body = vec![0u8; self.capacity * RECORD_SIZE];

        for _ in 0..SNAPSHOT_RETRIES {
            let before = read_sequence(&self.file)?;
            if before % 2 == 1 {
                // writer mid-publish
                continue;
            }

            self.file.read_exact_at(&mut body, HEADER_SIZE as u64)?;

            let after = read_sequence(&self.file)?;
            if before != after {
                continue;
            }

            let records = body
                .chunks_exact(RECORD_SIZE)
                .map(|chunk| {
                    let mut bytes = [0u8; RECORD_SIZE];
                    bytes.copy_from_slice(chunk);
                    TelemetryRecord::from_bytes(&bytes)
                })
                .collect();
            return Ok(records);
        }

        Err(RideLoggerError::SharedMemory(
            "snapshot kept racing the producer".to_string(),
        ))
    }
}
