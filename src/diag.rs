//! # Diagnostic Logging
//!
//! Best-effort text diagnostics for both binaries.
//!
//! Diagnostics go to a plain-text file under the configured directory via
//! a non-blocking appender. The diagnostic channel must never take the
//! process down: if the directory or file cannot be set up, logging falls
//! back to stdout and the telemetry path carries on regardless.

use std::fs;
use std::path::Path;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// Initialize diagnostics, preferring a file under `diag_dir`
///
/// Returns the appender guard that must stay alive for the lifetime of
/// the process; dropping it stops the background writer.
pub fn init(diag_dir: &Path, file_name: &str) -> Option<WorkerGuard> {
    match fs::create_dir_all(diag_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(diag_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .is_ok();

            if installed {
                return Some(guard);
            }
            None
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .try_init();
            warn!(
                "diagnostic log directory {} unavailable ({}), logging to stdout",
                diag_dir.display(),
                e
            );
            None
        }
    }
}
