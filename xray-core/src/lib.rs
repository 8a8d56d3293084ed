pub mod config;
pub mod error;
pub mod record;

pub use config::XrayConfig;
pub use error::XrayError;
pub use record::TelemetryRecord;
