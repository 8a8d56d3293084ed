//! One-shot transport: one record, one fresh TCP connection.
//!
//! The payload is the compact JSON record with no framing; the receiver
//! treats the sender's close as end-of-message. Never keep the connection
//! open past the write and never send two records on one connection.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;
use xray_core::config::ProbeConfig;
use xray_core::{TelemetryRecord, XrayError};

#[derive(Debug, Clone)]
pub struct TelemetrySender {
    addr: String,
    connect_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TelemetrySender {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            addr: config.receiver_addr(),
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Serialize and deliver `record`. Returns the number of payload bytes
    /// written. Failures are [`XrayError::Transport`] and are never retried.
    pub async fn send(&self, record: &TelemetryRecord) -> Result<usize, XrayError> {
        let payload = record.to_json()?;
        self.send_raw(payload.as_bytes()).await?;
        debug!(
            request_id = %record.request_id,
            addr = %self.addr,
            bytes = payload.len(),
            "Sent record to receiver"
        );
        Ok(payload.len())
    }

    /// Write `payload` on a new connection and close it.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<(), XrayError> {
        let connect = TcpStream::connect(&self.addr);
        let mut stream = with_deadline(self.connect_timeout, "connect", connect)
            .await
            .map_err(|e| XrayError::Transport(format!("{}: {e}", self.addr)))?;

        with_deadline(self.write_timeout, "write", async {
            stream.write_all(payload).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|e| XrayError::Transport(format!("{}: {e}", self.addr)))
    }
}

/// Run `fut` under an optional deadline. Elapsed deadlines surface as
/// `TimedOut` I/O errors.
async fn with_deadline<T, F>(deadline: Option<Duration>, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{what} timed out after {}ms", d.as_millis()),
            )
        })?,
        None => fut.await,
    }
}
