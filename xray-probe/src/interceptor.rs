//! axum middleware producing one telemetry record per request.
//!
//! ```ignore
//! let probe = Probe::new(ProbeConfig::from_env()?);
//! let app = xray_probe::instrument(Router::new().route("/items/{id}", get(item)), probe);
//! ```

use crate::capture::{self, BodyKind};
use crate::context::{CaptureContext, Phase};
use crate::handler_error::HandlerError;
use crate::queries::QueryScope;
use crate::sender::TelemetrySender;
use axum::Router;
use axum::extract::{FromRequestParts, RawPathParams, Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;
use xray_core::config::ProbeConfig;
use xray_core::record::ResponseError;

/// Shared interceptor state: configuration plus the transport.
#[derive(Clone)]
pub struct Probe {
    inner: Arc<ProbeInner>,
}

struct ProbeInner {
    config: ProbeConfig,
    sender: TelemetrySender,
}

impl Probe {
    pub fn new(config: ProbeConfig) -> Self {
        let sender = TelemetrySender::new(&config);
        Self {
            inner: Arc::new(ProbeInner { config, sender }),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.inner.config
    }

    pub fn sender(&self) -> &TelemetrySender {
        &self.inner.sender
    }
}

/// Wrap every route of `router` with the interceptor.
pub fn instrument<S>(router: Router<S>, probe: Probe) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(probe, intercept))
}

/// Drains the request's query scope however the interceptor exits,
/// including when the request future is dropped mid-flight.
struct CleanupGuard(QueryScope);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        trace!(request_id = %self.0.request_id(), phase = %Phase::Cleanup, "Capture phase");
        let leftover = self.0.drain();
        if !leftover.is_empty() {
            debug!(
                request_id = %self.0.request_id(),
                dropped = leftover.len(),
                "Discarded queries of an unfinished capture"
            );
        }
    }
}

/// The interceptor. Returns the downstream response unchanged; telemetry
/// failures are logged and never reach the client.
pub async fn intercept(State(probe): State<Probe>, request: Request, next: Next) -> Response {
    let limit = probe.config().max_body_bytes;
    let (mut parts, body) = request.into_parts();
    let mut ctx = CaptureContext::from_parts(&parts, Uuid::new_v4().to_string());
    let _cleanup = CleanupGuard(ctx.queries.clone());

    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        ctx.path_params = params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
    }

    // ── Body capture ──
    ctx.advance(Phase::BodyCapture);
    let kind = BodyKind::from_headers(&parts.headers);
    let (body, captured) = capture::capture_request_body(body, kind, limit).await;
    match captured {
        Ok(value) => ctx.body = value,
        Err(e) => warn!(request_id = %ctx.request_id, error = %e, "Request body not captured"),
    }
    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(ctx.queries.clone());

    // ── Downstream call ──
    ctx.advance(Phase::DownstreamCall);
    let started = Instant::now();
    let outcome = AssertUnwindSafe(ctx.queries.clone().scope(next.run(request)))
        .catch_unwind()
        .await;
    let response = match outcome {
        Ok(response) => {
            ctx.set_elapsed(Some(started.elapsed().as_secs_f64() * 1000.0));
            response
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(request_id = %ctx.request_id, error = %message, "Handler panicked");
            ctx.set_elapsed(None);
            HandlerError::unexpected(message).into_response()
        }
    };

    // ── Finalize ──
    ctx.advance(Phase::Finalize);
    let response = finalize(&mut ctx, response, limit).await;

    // ── Send ──
    ctx.advance(Phase::Send);
    let record = ctx.into_record();
    if let Err(e) = probe.sender().send(&record).await {
        warn!(
            request_id = %record.request_id,
            error = %e,
            "Telemetry record dropped"
        );
    }

    // ── Cleanup: `_cleanup` drops here ──
    response
}

/// Copy status and headers; for failures, capture the body as the error.
async fn finalize(ctx: &mut CaptureContext, response: Response, limit: usize) -> Response {
    let status = response.status();
    ctx.status_code = Some(status.as_u16());
    ctx.response_headers = capture::header_map(response.headers());

    if status.as_u16() < 400 {
        return response;
    }

    let (parts, body) = response.into_parts();
    let (body, captured) = capture::rebuffer(body, limit).await;
    ctx.error = Some(match captured {
        Ok(Some(bytes)) => ResponseError::from_body(&bytes),
        Ok(None) => ResponseError::from_body(b""),
        Err(e) => {
            warn!(request_id = %ctx.request_id, error = %e, "Error body not captured");
            ResponseError::from_body(b"")
        }
    });
    Response::from_parts(parts, body)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
