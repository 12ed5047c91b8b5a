//! Line-oriented JSON protocol to the RF switch matrix over a serial port.
//!
//! The firmware on the switch side accepts `{"set":"port","to":"<name>"}`
//! and answers `{"report":"port","is":"<name>"}`. Replies may arrive split
//! across several packets, and stale output from earlier commands may still
//! be sitting in the OS buffer, so every transaction drains first and then
//! accumulates the reply until the line goes quiet.

mod mock;

pub use mock::MockSwitch;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// The eight positions the switch matrix can route to the VNA.
pub const PORT_NAMES: [&str; 8] = [
    "short", "open", "load", "thru", "dut1", "dut2", "dut3", "dut4",
];

/// Read timeout used while draining stale input before a command.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Read timeout used while accumulating the remainder of a reply. Shorter
/// values truncate multi-packet replies (empirical minimum, see the drain
/// timeouts note in the driver docs).
const SETTLE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct SetCommand<'a> {
    set: &'a str,
    to: &'a str,
}

#[derive(Debug, Deserialize)]
struct Report {
    report: String,
    is: String,
}

/// Anything that can route the VNA to a named position.
#[async_trait]
pub trait Switch: Send + Sync {
    /// Moves the switch to `name` and confirms the move.
    async fn set_port(&self, name: &str) -> Result<()>;

    /// The last position a successful [`Switch::set_port`] committed, or
    /// `"unknown"` before the first.
    async fn current(&self) -> String;
}

struct Inner<T> {
    io: T,
    port: String,
}

/// Serial driver for the RF switch. Generic over the byte stream so tests
/// can run against an in-memory pipe; production uses a
/// [`tokio_serial::SerialStream`].
///
/// All transactions are serialized by an internal lock: at most one
/// `set_port` is on the wire at any time.
pub struct RfSwitch<T> {
    inner: Mutex<Inner<T>>,
    read_timeout: Duration,
    drain_timeout: Duration,
    settle_timeout: Duration,
}

impl RfSwitch<SerialStream> {
    /// Opens the serial port at `path` with the given baud rate and
    /// per-read timeout.
    pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<Self> {
        let io = tokio_serial::new(path, baud)
            .open_native_async()
            .with_context(|| format!("failed to open switch serial port {path}"))?;
        tracing::info!("opened switch serial port {path} at {baud} baud");
        Ok(Self::with_io(io, read_timeout))
    }
}

impl<T> RfSwitch<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already-open byte stream.
    pub fn with_io(io: T, read_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                io,
                port: "unknown".to_string(),
            }),
            read_timeout,
            drain_timeout: DRAIN_TIMEOUT,
            settle_timeout: SETTLE_TIMEOUT,
        }
    }

    /// Overrides the two drain-phase timeouts (10 ms / 100 ms by default).
    pub fn with_drain_timeouts(mut self, drain: Duration, settle: Duration) -> Self {
        self.drain_timeout = drain;
        self.settle_timeout = settle;
        self
    }
}

/// Reads until the stream stays quiet for `per_read`, appending everything
/// received to `out`. A timed-out read is the end-of-data signal, not an
/// error; a genuine I/O error aborts.
async fn gather<T>(io: &mut T, per_read: Duration, out: &mut Vec<u8>) -> Result<()>
where
    T: AsyncRead + Unpin,
{
    let mut buf = [0u8; 128];
    loop {
        match timeout(per_read, io.read(&mut buf)).await {
            Err(_elapsed) => return Ok(()),
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => return Err(e).context("reading from switch serial port"),
        }
    }
}

#[async_trait]
impl<T> Switch for RfSwitch<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_port(&self, name: &str) -> Result<()> {
        if !PORT_NAMES.contains(&name) {
            bail!("unknown switch port: {name}");
        }

        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        // drop whatever a previous transaction left behind
        let mut stale = Vec::new();
        gather(&mut inner.io, self.drain_timeout, &mut stale).await?;
        if !stale.is_empty() {
            debug!("drained {} stale bytes from switch", stale.len());
        }

        let request = serde_json::to_vec(&SetCommand {
            set: "port",
            to: name,
        })?;
        inner
            .io
            .write_all(&request)
            .await
            .context("writing command to switch serial port")?;
        debug!("wrote {} to switch", String::from_utf8_lossy(&request));

        // first chunk of the reply, bounded by the configured read timeout
        let mut reply = Vec::with_capacity(128);
        let mut buf = [0u8; 128];
        let n = timeout(self.read_timeout, inner.io.read(&mut buf))
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for switch reply"))?
            .context("reading reply from switch serial port")?;
        if n == 0 {
            bail!("empty reply from switch");
        }
        reply.extend_from_slice(&buf[..n]);

        // the firmware may emit the reply in several packets; keep reading
        // until the line goes quiet so we never parse a truncated frame
        gather(&mut inner.io, self.settle_timeout, &mut reply).await?;

        let report: Report = serde_json::from_slice(&reply).with_context(|| {
            format!(
                "unmarshalling switch reply failed, reply was {}",
                String::from_utf8_lossy(&reply)
            )
        })?;

        if !report.report.eq_ignore_ascii_case("port") {
            bail!("switch response was not a port report: {}", report.report);
        }
        if !report.is.eq_ignore_ascii_case(name) {
            bail!("switch reports port {} not {name}", report.is);
        }

        inner.port = name.to_string();
        debug!("switch set to {name}");
        Ok(())
    }

    async fn current(&self) -> String {
        self.inner.lock().await.port.clone()
    }
}
