use crate::error::XrayError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration for both sides of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XrayConfig {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Embedded side: where records are sent and how much is captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for connecting to the receiver. Unset = wait indefinitely.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Deadline for writing one payload. Unset = wait indefinitely.
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
    /// Bodies larger than this (or of unknown length) are not buffered.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Monitor side: receiver binding, queue bounds, and poll cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for reading one connection to EOF. Unset = wait indefinitely.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// 0 = unbounded.
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8989 }
fn default_max_body_bytes() -> usize { 1024 * 1024 }
fn default_max_payload_bytes() -> usize { 16 * 1024 * 1024 }
fn default_refresh_interval() -> u64 { 1000 }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: None,
            write_timeout_ms: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_ms: None,
            max_payload_bytes: default_max_payload_bytes(),
            queue_capacity: 0,
            refresh_interval_ms: default_refresh_interval(),
        }
    }
}

impl XrayConfig {
    /// Load configuration from YAML file + env overrides
    /// (`XRAY_MONITOR__PORT=9000`).
    pub fn load(path: &Path) -> Result<Self, XrayError> {
        let config: XrayConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("XRAY_").split("__"))
            .extract()?;
        debug!(
            path = %path.display(),
            receiver = %config.monitor.bind_addr(),
            "Config loaded"
        );
        Ok(config)
    }
}

impl ProbeConfig {
    /// Defaults overridden by `XRAY_HOST` / `XRAY_PORT`.
    pub fn from_env() -> Result<Self, XrayError> {
        let config: ProbeConfig = Figment::new()
            .merge(Env::prefixed("XRAY_").only(&["host", "port"]))
            .extract()?;
        Ok(config)
    }

    pub fn receiver_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

impl MonitorConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}
