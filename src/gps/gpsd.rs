//! gpsd client speaking the JSON watch protocol over TCP
//!
//! On connect the client sends a `?WATCH` enable command and spawns a
//! background task that reads report lines and feeds parsed TPV fixes
//! into a channel. The acquisition loop drains that channel without
//! blocking. When the stream ends the client marks itself disconnected
//! and the loop falls back to its per-iteration reconnect attempts.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, RideLoggerError};
use crate::gps::source_trait::GpsSource;
use crate::gps::{FixMode, FixStatus, GpsFixSnapshot};

const WATCH_ENABLE: &str = "?WATCH={\"enable\":true,\"json\":true}\n";
const WATCH_DISABLE: &str = "?WATCH={\"enable\":false}\n";

/// One TPV report line as gpsd emits it
///
/// Only the fields the fix snapshot needs; everything else in the report
/// is ignored. `status` is absent for ordinary fixes, so it defaults to
/// the plain-fix value.
#[derive(Debug, Deserialize)]
struct TpvReport {
    class: String,
    #[serde(default)]
    mode: i32,
    #[serde(default = "default_status")]
    status: i32,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altHAE")]
    alt_hae: Option<f64>,
    speed: Option<f64>,
}

fn default_status() -> i32 {
    1
}

fn parse_report(line: &str) -> Option<GpsFixSnapshot> {
    let report: TpvReport = match serde_json::from_str(line) {
        Ok(report) => report,
        Err(e) => {
            debug!("unparseable gpsd line: {}", e);
            return None;
        }
    };

    if report.class != "TPV" {
        return None;
    }

    Some(GpsFixSnapshot {
        status: FixStatus::from_raw(report.status),
        mode: FixMode::from_raw(report.mode),
        latitude: report.lat.unwrap_or(f64::NAN),
        longitude: report.lon.unwrap_or(f64::NAN),
        altitude: report.alt.or(report.alt_hae).unwrap_or(0.0),
        speed: report.speed.unwrap_or(0.0),
    })
}

struct Connection {
    rx: mpsc::UnboundedReceiver<GpsFixSnapshot>,
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

/// gpsd connection handle
pub struct GpsdClient {
    host: String,
    port: u16,
    conn: Option<Connection>,
}

impl GpsdClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            conn: None,
        }
    }
}

#[async_trait]
impl GpsSource for GpsdClient {
    async fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                RideLoggerError::Gps(format!(
                    "failed to connect to gpsd at {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;

        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(WATCH_ENABLE.as_bytes())
            .await
            .map_err(|e| RideLoggerError::Gps(format!("failed to enable watch: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(fix) = parse_report(&line) {
                            if tx.send(fix).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("gpsd stream read failed: {}", e);
                        break;
                    }
                }
            }
        });

        self.conn = Some(Connection {
            rx,
            writer: write_half,
            reader_task,
        });

        info!("connected to gpsd at {}:{}", self.host, self.port);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn poll_fix(&mut self) -> Option<GpsFixSnapshot> {
        let conn = self.conn.as_mut()?;

        let mut latest = None;
        let mut stream_ended = false;
        loop {
            match conn.rx.try_recv() {
                Ok(fix) => latest = Some(fix),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    stream_ended = true;
                    break;
                }
            }
        }

        if stream_ended {
            warn!("gpsd stream ended, dropping connection");
            if let Some(conn) = self.conn.take() {
                conn.reader_task.abort();
            }
        }

        latest
    }

    async fn disconnect(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            // best effort; the peer may already be gone
            if let Err(e) = conn.writer.write_all(WATCH_DISABLE.as_bytes()).await {
                debug!("failed to disable watch: {}", e);
            }
            conn.reader_task.abort();
        }
    }
}
