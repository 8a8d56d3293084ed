//! Telemetry record schema shared by the probe and the monitor.
//!
//! A record is the JSON object carried by one connection on the wire. Field
//! names are part of the protocol and must not be renamed.

use crate::error::XrayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sentinel stored in `elapsed_time` when the downstream call failed before
/// its timing completed.
pub const ELAPSED_NOT_AVAILABLE: &str = "N/A";

/// One handled request: request snapshot, response summary, correlated
/// queries, and downstream timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub request_id: String,
    pub request: RequestInfo,
    pub response: ResponseInfo,
    pub sql: Vec<SqlQuery>,
    pub elapsed_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, Value>,
    #[serde(default)]
    pub path_params: BTreeMap<String, Value>,
    pub path: String,
    pub status_code: u16,
    pub method: String,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, flattened form body, or null.
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: ErrorMessage,
}

/// Error body of a failed response.
///
/// Plain strings stay strings on the wire; anything else (declared error
/// detail, validation error lists) is carried as structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    Text(String),
    Structured(Value),
}

/// How an error message should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub statement: String,
    pub execution_time: String,
}

// ── Impls ─────────────────────────────────────────────────────

impl ResponseError {
    /// Classify a raw response body: JSON if it parses, text otherwise.
    pub fn from_body(body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<Value>(body) {
            Ok(Value::String(s)) => ErrorMessage::Text(s),
            Ok(v) => ErrorMessage::Structured(v),
            Err(_) => ErrorMessage::Text(String::from_utf8_lossy(body).into_owned()),
        };
        Self { message }
    }

    pub fn format(&self) -> ErrorFormat {
        match &self.message {
            ErrorMessage::Structured(_) => ErrorFormat::Json,
            ErrorMessage::Text(s) => {
                if serde_json::from_str::<Value>(s).is_ok() {
                    ErrorFormat::Json
                } else {
                    ErrorFormat::Text
                }
            }
        }
    }

    /// Display text: pretty JSON for structured messages, raw text otherwise.
    pub fn display_text(&self) -> String {
        match &self.message {
            ErrorMessage::Structured(v) => pretty_json(v),
            ErrorMessage::Text(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => pretty_json(&v),
                Err(_) => s.clone(),
            },
        }
    }
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            statement: statement.into(),
            execution_time: format_millis(elapsed_ms),
        }
    }
}

impl TelemetryRecord {
    /// Decode and validate a payload received from the wire.
    ///
    /// Malformed JSON is a [`XrayError::Decode`]; well-formed JSON that does
    /// not fit the schema is a [`XrayError::Validation`].
    pub fn from_json(text: &str) -> Result<Self, XrayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| XrayError::Decode(e.to_string()))?;
        let record: TelemetryRecord =
            serde_json::from_value(value).map_err(|e| XrayError::Validation(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Compact JSON payload for the wire.
    pub fn to_json(&self) -> Result<String, XrayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), XrayError> {
        if self.request_id.trim().is_empty() {
            return Err(XrayError::Validation("request_id is empty".into()));
        }
        if self.request.method.trim().is_empty() {
            return Err(XrayError::Validation("request.method is empty".into()));
        }
        if self.elapsed_time != ELAPSED_NOT_AVAILABLE && self.elapsed_ms().is_none() {
            return Err(XrayError::Validation(format!(
                "elapsed_time {:?} is not a decimal number",
                self.elapsed_time
            )));
        }
        Ok(())
    }

    /// Downstream duration in milliseconds, `None` for the `N/A` sentinel.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.elapsed_time
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
    }

    /// List label shown by the monitor, e.g. `1. [GET] /x`.
    pub fn summary_label(&self, ordinal: usize) -> String {
        format!("{}. [{}] {}", ordinal, self.request.method, self.request.path)
    }
}

/// Milliseconds with four decimals, the on-wire duration format.
pub fn format_millis(ms: f64) -> String {
    format!("{:.4}", ms)
}

/// Two-space indented JSON.
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
