//! # Acquisition Loop
//!
//! Drives one iteration per cycle: sample the ignition detector and
//! create/destroy the session, perform the bounded wait for a bus frame,
//! then poll GPS. All state lives in one [`Acquisition`] value threaded
//! through the loop; the only outside signal is the shutdown flag flipped
//! by the signal handler and checked once per iteration.
//!
//! Fatal conditions (GPIO read failure, bus wait failure, log-open or
//! session-start GPS failure) stop the loop with an error after cleanup.
//! Everything GPS-related after session start is retried quietly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bus::FrameSource;
use crate::clock::SessionClock;
use crate::config::Config;
use crate::error::Result;
use crate::gps::{FixEncoder, GpsSource};
use crate::ignition::{IgnitionDetector, IgnitionEdge, IgnitionInput};
use crate::logfile::RideLog;
use crate::record::{TelemetryRecord, GPS_ALT_SPD_ID, GPS_POS_ID};

/// One ignition-on interval: the open ride log and its time origin
///
/// Exactly one session exists at a time; the previous one is fully closed
/// before the next is created.
struct Session {
    log: RideLog,
    clock: SessionClock,
}

/// The acquisition context threaded through the loop
pub struct Acquisition<I: IgnitionInput, F: FrameSource, G: GpsSource> {
    ignition: IgnitionDetector<I>,
    bus: F,
    gps: G,
    encoder: FixEncoder,
    /// Frame payload scratch. Only a frame's declared bytes are copied in,
    /// so records of short frames carry leftovers of earlier frames in
    /// their tail; log readers must mask by the frame's real length
    /// themselves.
    scratch: [u8; 8],
    session: Option<Session>,
    data_dir: PathBuf,
    read_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<I: IgnitionInput, F: FrameSource, G: GpsSource> Acquisition<I, F, G> {
    pub fn new(config: &Config, input: I, bus: F, gps: G, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            ignition: IgnitionDetector::new(input),
            bus,
            gps,
            encoder: FixEncoder::new(),
            scratch: [0u8; 8],
            session: None,
            data_dir: PathBuf::from(&config.logging.data_dir),
            read_timeout: Duration::from_millis(config.bus.read_timeout_ms),
            shutdown,
        }
    }

    /// Run until shutdown or a fatal condition, then clean up
    pub async fn run(&mut self) -> Result<()> {
        info!("acquisition loop started");
        let result = self.drive().await;
        self.teardown().await;
        result
    }

    async fn drive(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.iterate().await?;
        }
        info!("shutdown requested");
        Ok(())
    }

    async fn iterate(&mut self) -> Result<()> {
        self.update_session().await?;
        self.capture_frame().await?;
        self.poll_gps().await;
        Ok(())
    }

    async fn update_session(&mut self) -> Result<()> {
        match self.ignition.sample()? {
            IgnitionEdge::TurnedOn => self.open_session().await,
            IgnitionEdge::TurnedOff => {
                self.close_session().await;
                Ok(())
            }
            IgnitionEdge::None => Ok(()),
        }
    }

    async fn open_session(&mut self) -> Result<()> {
        let log = RideLog::create(&self.data_dir)?;

        // the one place a GPS connect failure is fatal; once a session
        // runs, reconnects are retried quietly every iteration
        if !self.gps.is_connected() {
            self.gps.connect().await?;
        }

        let mut clock = SessionClock::new();
        clock.reset();

        self.session = Some(Session { log, clock });
        Ok(())
    }

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.log.close() {
                warn!("failed to finalize ride log: {}", e);
            }
            self.gps.disconnect().await;
        }
    }

    async fn capture_frame(&mut self) -> Result<()> {
        let Some(frame) = self.bus.recv(self.read_timeout).await? else {
            return Ok(());
        };

        let len = (frame.len as usize).min(8);
        self.scratch[..len].copy_from_slice(&frame.data[..len]);

        if let Some(session) = &mut self.session {
            let (seconds, millis) = session.clock.elapsed();
            // extended identifiers keep only their low 16 bits
            let record = TelemetryRecord::new(seconds, millis, frame.id as u16, self.scratch);
            session.log.append(&record);
        }
        Ok(())
    }

    async fn poll_gps(&mut self) {
        if !self.gps.is_connected() {
            if let Err(e) = self.gps.connect().await {
                debug!("gpsd not reachable: {}", e);
            }
            return;
        }

        let Some(fix) = self.gps.poll_fix() else {
            return;
        };

        if !fix.is_usable() {
            debug!("gps not fixed status:{:?} mode:{:?}", fix.status, fix.mode);
            return;
        }

        // a repeated position ends the iteration right here
        let Some(encoded) = self.encoder.encode(&fix) else {
            return;
        };

        if let Some(session) = &mut self.session {
            let (seconds, millis) = session.clock.elapsed();
            session.log.append(&TelemetryRecord::new(
                seconds,
                millis,
                GPS_POS_ID,
                encoded.position_payload(),
            ));
            session.log.append(&TelemetryRecord::new(
                seconds,
                millis,
                GPS_ALT_SPD_ID,
                encoded.motion_payload(),
            ));
        }
    }

    async fn teardown(&mut self) {
        self.close_session().await;
        if self.gps.is_connected() {
            self.gps.disconnect().await;
        }
        info!("acquisition loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::source_trait::mocks::ScriptedFrameSource;
    use crate::bus::BusFrame;
    use crate::gps::source_trait::mocks::ScriptedGps;
    use crate::gps::{EncodedFix, FixMode, FixStatus, GpsFixSnapshot};
    use crate::ignition::mocks::ScriptedInput;
    use crate::record::RECORD_SIZE;
    use std::fs;
    use std::path::Path;

    fn test_config(data_dir: &Path) -> Config {
        let mut config = Config::default();
        config.logging.data_dir = data_dir.to_str().unwrap().to_string();
        config
    }

    fn fix(longitude: f64, latitude: f64) -> GpsFixSnapshot {
        GpsFixSnapshot {
            status: FixStatus::Fix,
            mode: FixMode::ThreeD,
            latitude,
            longitude,
            altitude: 100.0,
            speed: 5.0,
        }
    }

    /// All records currently in the single .dat file under `dir`
    fn read_log_records(dir: &Path) -> Vec<TelemetryRecord> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(paths.len(), 1, "expected exactly one ride log in {:?}", dir);
        decode_log(&fs::read(paths.remove(0)).unwrap())
    }

    /// Total records across every .dat file under `dir`
    fn count_all_records(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| decode_log(&fs::read(entry.unwrap().path()).unwrap()).len())
            .sum()
    }

    fn decode_log(bytes: &[u8]) -> Vec<TelemetryRecord> {
        assert_eq!(bytes.len() % RECORD_SIZE, 0);
        bytes
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let mut raw = [0u8; RECORD_SIZE];
                raw.copy_from_slice(chunk);
                TelemetryRecord::from_bytes(&raw)
            })
            .collect()
    }

    struct Rig {
        acquisition: Acquisition<ScriptedInput, ScriptedFrameSource, ScriptedGps>,
        ignition: ScriptedInput,
        bus: ScriptedFrameSource,
        gps: ScriptedGps,
    }

    fn rig(data_dir: &Path) -> Rig {
        let ignition = ScriptedInput::new([]);
        let bus = ScriptedFrameSource::new();
        let gps = ScriptedGps::new();
        let acquisition = Acquisition::new(
            &test_config(data_dir),
            ignition.clone(),
            bus.clone(),
            gps.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        Rig {
            acquisition,
            ignition,
            bus,
            gps,
        }
    }

    /// One loop iteration with an explicit ignition sample
    async fn step(rig: &mut Rig, key_on: bool) {
        rig.ignition.push(key_on);
        rig.acquisition.iterate().await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_logged_only_during_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        // key on: two debounce iterations, session opens on the third
        step(&mut rig, true).await;
        step(&mut rig, true).await;
        rig.bus
            .push_frame(BusFrame::new(0x100, &[1, 2, 3, 4, 5, 6, 7, 8]));
        step(&mut rig, true).await;

        let records = read_log_records(dir.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 0x100);
        assert_eq!(records[0].payload, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(records[0].elapsed_seconds, 0, "session just started");

        // key off: session closes on the third all-off window
        step(&mut rig, false).await;
        step(&mut rig, false).await;
        step(&mut rig, false).await;
        assert_eq!(rig.gps.disconnects(), 1);

        // frames between sessions are dropped, not buffered
        rig.bus.push_frame(BusFrame::new(0x200, &[9; 8]));
        step(&mut rig, false).await;

        let records = read_log_records(dir.path());
        assert_eq!(records.len(), 1, "no appends after the session closed");
    }

    #[tokio::test]
    async fn test_gps_fix_becomes_two_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;

        rig.gps.push_fix(fix(-122.0, 37.0));
        step(&mut rig, true).await;

        let records = read_log_records(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, GPS_POS_ID);
        assert_eq!(records[1].id, GPS_ALT_SPD_ID);
        assert_eq!(
            records[0].elapsed_seconds, records[1].elapsed_seconds,
            "both records share the fix timestamp"
        );
        assert_eq!(records[0].elapsed_millis, records[1].elapsed_millis);

        let expected = EncodedFix::from_fix(&fix(-122.0, 37.0));
        assert_eq!(records[0].payload, expected.position_payload());
        assert_eq!(records[1].payload, expected.motion_payload());
    }

    #[tokio::test]
    async fn test_duplicate_fix_is_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;

        rig.gps.push_fix(fix(-122.0, 37.0));
        step(&mut rig, true).await;
        rig.gps.push_fix(fix(-122.0, 37.0));
        step(&mut rig, true).await;

        let records = read_log_records(dir.path());
        assert_eq!(records.len(), 2, "the repeated fix must not be persisted");

        rig.gps.push_fix(fix(-122.001, 37.0));
        step(&mut rig, true).await;
        assert_eq!(read_log_records(dir.path()).len(), 4);
    }

    #[tokio::test]
    async fn test_nan_fix_is_never_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;

        rig.gps.push_fix(fix(-122.0, f64::NAN));
        step(&mut rig, true).await;

        assert!(read_log_records(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_dedup_state_survives_session_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;
        rig.gps.push_fix(fix(-122.0, 37.0));
        step(&mut rig, true).await;
        assert_eq!(read_log_records(dir.path()).len(), 2);

        step(&mut rig, false).await;
        step(&mut rig, false).await;
        step(&mut rig, false).await;

        // second session: same position is still a repeat
        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;
        rig.gps.push_fix(fix(-122.0, 37.0));
        step(&mut rig, true).await;

        // only the first session's pair exists anywhere on disk (or none,
        // when a same-second reopen truncated that file)
        assert!(
            count_all_records(dir.path()) <= 2,
            "dedup state belongs to the loop, not the session"
        );
    }

    #[tokio::test]
    async fn test_short_frame_keeps_stale_tail_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        step(&mut rig, true).await;
        step(&mut rig, true).await;
        step(&mut rig, true).await;

        rig.bus.push_frame(BusFrame::new(0x100, &[0xAA; 8]));
        step(&mut rig, true).await;
        rig.bus.push_frame(BusFrame::new(0x2A0, &[1, 2]));
        step(&mut rig, true).await;

        let records = read_log_records(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].payload,
            [1, 2, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA],
            "tail of a short frame carries the previous frame's bytes"
        );
    }

    #[tokio::test]
    async fn test_gps_connect_failure_is_fatal_at_session_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());
        rig.gps.set_fail_connect(true);

        // ambient reconnect attempts while off are not fatal
        step(&mut rig, true).await;
        step(&mut rig, true).await;
        assert!(rig.gps.connect_attempts() >= 2);

        // the connect at session start is
        rig.ignition.push(true);
        assert!(rig.acquisition.iterate().await.is_err());
    }

    #[tokio::test]
    async fn test_bus_wait_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        rig.ignition.push(false);
        rig.bus.push_error();
        assert!(rig.acquisition.iterate().await.is_err());
    }

    #[tokio::test]
    async fn test_gpio_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = rig(dir.path());

        rig.ignition.push_error();
        assert!(rig.acquisition.iterate().await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_flag_and_closes_session() {
        let dir = tempfile::tempdir().unwrap();

        let ignition = ScriptedInput::new([true, true, true, true]);
        let bus = ScriptedFrameSource::new();
        let gps = ScriptedGps::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut acquisition = Acquisition::new(
            &test_config(dir.path()),
            ignition.clone(),
            bus.clone(),
            gps.clone(),
            shutdown.clone(),
        );

        // open a session, then request shutdown
        acquisition.iterate().await.unwrap();
        acquisition.iterate().await.unwrap();
        acquisition.iterate().await.unwrap();
        shutdown.store(true, Ordering::Relaxed);
        acquisition.run().await.unwrap();

        assert_eq!(gps.disconnects(), 1, "cleanup must disconnect the GPS session");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "cleanup must close and rename the open log");
    }
}
