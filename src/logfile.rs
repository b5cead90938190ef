//! # Log File Lifecycle
//!
//! Opens, writes, closes and renames the per-session binary ride log.
//!
//! A log is a plain concatenation of 16-byte records with no header. Its
//! working name comes from the wall clock at open; on close it is renamed
//! after the wall clock at that moment, so the final name tells when the
//! ride ended. Only the acquisition loop decides when a log exists;
//! records captured between sessions are dropped, never buffered.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::record::TelemetryRecord;

/// Derive a log file name from a wall-clock timestamp
///
/// Two sessions closing within the same second yield identical names; the
/// later rename then overwrites the earlier file.
pub fn log_file_name(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S.dat").to_string()
}

/// One open per-session ride log
pub struct RideLog {
    dir: PathBuf,
    path: PathBuf,
    file: File,
}

impl RideLog {
    /// Open a new log under `dir`, named from the wall clock at open time
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created; that is fatal to the
    /// loop because a session without a log has nothing to do.
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(log_file_name(&Local::now()));
        // truncate: a session reopening within the same wall-clock second
        // takes over the previous file rather than appending to it
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        info!("opened ride log {}", path.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            file,
        })
    }

    /// Append one record
    ///
    /// Write failures are logged and swallowed; losing single records is
    /// preferable to killing the ride mid-session.
    pub fn append(&mut self, record: &TelemetryRecord) {
        if let Err(e) = self.file.write_all(&record.to_bytes()) {
            warn!("failed to append record to {}: {}", self.path.display(), e);
        }
    }

    /// Close the log and rename it after the wall clock at close time
    pub fn close(self) -> Result<PathBuf> {
        drop(self.file);

        let final_path = self.dir.join(log_file_name(&Local::now()));
        fs::rename(&self.path, &final_path)?;

        info!("closed ride log as {}", final_path.display());
        Ok(final_path)
    }

    /// Working path of the log while the session is active
    pub fn path(&self) -> &Path {
        &self.path
    }
}
