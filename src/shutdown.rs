//! Cooperative shutdown flag driven by Unix termination signals
//!
//! The handlers only flip an atomic flag; each loop checks it once per
//! iteration and cleans up on its own schedule.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Spawn a listener that flips the returned flag on SIGTERM, SIGINT or SIGHUP
///
/// Must be called from within a tokio runtime.
pub fn shutdown_flag() -> io::Result<Arc<AtomicBool>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;

    let flag = Arc::new(AtomicBool::new(false));
    let task_flag = flag.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            _ = int.recv() => info!("received SIGINT"),
            _ = hup.recv() => info!("received SIGHUP"),
        }
        task_flag.store(true, Ordering::Relaxed);
    });

    Ok(flag)
}
