use crate::capture;
use crate::queries::QueryScope;
use http::request::Parts;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;
use xray_core::record::{
    ELAPSED_NOT_AVAILABLE, RequestInfo, ResponseError, ResponseInfo, TelemetryRecord,
    format_millis,
};

/// Interceptor lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Start = 0,
    /// Request body read once and re-buffered for the downstream
    BodyCapture = 1,
    /// Timed call into the wrapped handler
    DownstreamCall = 2,
    /// Response inspected, record assembled
    Finalize = 3,
    /// Record handed to the transport
    Send = 4,
    /// Query accumulator drained
    Cleanup = 5,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::BodyCapture => "body_capture",
            Phase::DownstreamCall => "downstream_call",
            Phase::Finalize => "finalize",
            Phase::Send => "send",
            Phase::Cleanup => "cleanup",
        }
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::Start,
            Phase::BodyCapture,
            Phase::DownstreamCall,
            Phase::Finalize,
            Phase::Send,
            Phase::Cleanup,
        ]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the interceptor learns about one request while it is in
/// flight. Consumed by [`CaptureContext::into_record`].
pub struct CaptureContext {
    pub request_id: String,
    phase: Phase,

    // --- Request data ---
    pub base_url: String,
    pub method: String,
    pub path: String,
    pub query_params: BTreeMap<String, Value>,
    pub path_params: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: Option<Value>,

    // --- Response data (populated at finalize) ---
    pub status_code: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub error: Option<ResponseError>,

    // --- Correlation + timing ---
    pub queries: QueryScope,
    pub elapsed_time: Option<String>,
}

impl CaptureContext {
    pub fn from_parts(parts: &Parts, request_id: String) -> Self {
        let queries = QueryScope::new(&request_id);
        Self {
            base_url: capture::base_url(parts),
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query_params: capture::parse_query(parts.uri.query()),
            path_params: BTreeMap::new(),
            headers: capture::header_map(&parts.headers),
            cookies: capture::parse_cookies(&parts.headers),
            body: None,
            status_code: None,
            response_headers: BTreeMap::new(),
            error: None,
            queries,
            elapsed_time: None,
            phase: Phase::Start,
            request_id,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `next`. Phases only move forward.
    pub fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {} after {}", next, self.phase);
        trace!(request_id = %self.request_id, from = %self.phase, to = %next, "Capture phase");
        self.phase = next;
    }

    /// Record downstream timing; `None` means the call failed before timing
    /// completed.
    pub fn set_elapsed(&mut self, elapsed_ms: Option<f64>) {
        self.elapsed_time = Some(match elapsed_ms {
            Some(ms) => format_millis(ms),
            None => ELAPSED_NOT_AVAILABLE.to_string(),
        });
    }

    /// Assemble the record, draining the query scope.
    pub fn into_record(self) -> TelemetryRecord {
        TelemetryRecord {
            sql: self.queries.drain(),
            request: RequestInfo {
                base_url: self.base_url,
                query_params: self.query_params,
                path_params: self.path_params,
                path: self.path,
                status_code: self.status_code.unwrap_or(500),
                method: self.method,
                cookies: self.cookies,
                headers: self.headers,
                body: self.body,
            },
            response: ResponseInfo {
                headers: self.response_headers,
                error: self.error,
            },
            elapsed_time: self
                .elapsed_time
                .unwrap_or_else(|| ELAPSED_NOT_AVAILABLE.to_string()),
            request_id: self.request_id,
        }
    }
}
