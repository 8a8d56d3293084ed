use thiserror::Error;

/// Unified error type for the telemetry pipeline.
///
/// Every variant except [`XrayError::ReceiverFault`] is recoverable: the
/// caller logs it and drops the record in flight.
#[derive(Error, Debug)]
pub enum XrayError {
    /// The interceptor could not build a complete record.
    #[error("Capture error: {0}")]
    Capture(String),

    /// Connecting to or writing to the receiver failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A payload could not be decoded (not UTF-8, not JSON, too large).
    #[error("Decode error: {0}")]
    Decode(String),

    /// A payload decoded but does not match the record schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The receiver's accept loop itself failed.
    #[error("Receiver fault: {0}")]
    ReceiverFault(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl XrayError {
    /// Whether the error must stop the component that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, XrayError::ReceiverFault(_))
    }

    /// Short class name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            XrayError::Capture(_) => "capture",
            XrayError::Transport(_) => "transport",
            XrayError::Decode(_) => "decode",
            XrayError::Validation(_) => "validation",
            XrayError::ReceiverFault(_) => "receiver_fault",
            XrayError::Config(_) => "config",
            XrayError::Io(_) => "io",
            XrayError::Serde(_) => "serde",
        }
    }
}

impl From<figment::Error> for XrayError {
    fn from(e: figment::Error) -> Self {
        XrayError::Config(e.to_string())
    }
}
