//! Listener that turns one inbound connection into one queued payload.
//!
//! Connections are handled strictly one at a time: accept, read to EOF,
//! decode, enqueue, then accept again. Per-connection failures are logged and
//! the connection dropped; only failures of the loop itself are returned.

use crossbeam_channel::{Sender, TrySendError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use xray_core::XrayError;
use xray_core::config::MonitorConfig;

pub struct Receiver {
    listener: TcpListener,
    read_timeout: Option<Duration>,
    max_payload_bytes: usize,
}

impl Receiver {
    pub async fn bind(config: &MonitorConfig) -> Result<Self, XrayError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| XrayError::ReceiverFault(format!("bind {addr}: {e}")))?;
        info!(addr = %addr, "Receiver listening");
        Ok(Self {
            listener,
            read_timeout: config.read_timeout(),
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, XrayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the listener fails or the queue's consumer is
    /// gone; both end in [`XrayError::ReceiverFault`].
    pub async fn run(self, queue: Sender<String>) -> Result<(), XrayError> {
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                error!(error = %e, "Accept error");
                XrayError::ReceiverFault(format!("accept: {e}"))
            })?;

            let payload = match self.read_payload(stream).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(peer = %peer, kind = e.kind(), error = %e, "Payload dropped");
                    continue;
                }
            };
            info!(peer = %peer, bytes = payload.len(), "Received payload");

            match queue.try_send(payload) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(peer = %peer, "Queue full, payload dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    error!("Queue consumer disconnected");
                    return Err(XrayError::ReceiverFault("queue disconnected".into()));
                }
            }
        }
    }

    /// Read until the peer closes, bounded by the payload limit and the
    /// optional read deadline. The stream is closed on return.
    async fn read_payload(&self, stream: TcpStream) -> Result<String, XrayError> {
        let limit = self.max_payload_bytes;
        let mut buf = Vec::new();
        let read = async {
            let mut bounded = stream.take(limit as u64 + 1);
            bounded.read_to_end(&mut buf).await
        };
        match self.read_timeout {
            Some(d) => tokio::time::timeout(d, read).await.map_err(|_| {
                XrayError::Decode(format!("read timed out after {}ms", d.as_millis()))
            })??,
            None => read.await?,
        };

        if buf.len() > limit {
            return Err(XrayError::Decode(format!("payload exceeds {limit} bytes")));
        }
        debug!(bytes = buf.len(), "Connection read to EOF");
        String::from_utf8(buf).map_err(|e| XrayError::Decode(format!("invalid UTF-8: {e}")))
    }
}
