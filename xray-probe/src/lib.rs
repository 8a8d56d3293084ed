//! Embedded side of X-Ray.
//!
//! Wrap an axum router with [`instrument`] and every request produces one
//! [`TelemetryRecord`](xray_core::TelemetryRecord), shipped to the monitor
//! over a fresh TCP connection. Backing-store hooks report queries through
//! [`queries::QueryTimer`]; they are attributed to the request whose
//! [`QueryScope`] is active.

pub mod capture;
pub mod context;
pub mod handler_error;
pub mod interceptor;
pub mod queries;
pub mod sender;

pub use context::{CaptureContext, Phase};
pub use handler_error::HandlerError;
pub use interceptor::{Probe, instrument, intercept};
pub use queries::{QueryScope, QueryTimer};
pub use sender::TelemetrySender;
