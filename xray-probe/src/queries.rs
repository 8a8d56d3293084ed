//! Request-scoped correlation of backing-store queries.
//!
//! Query hooks fire from inside whatever database driver the service uses and
//! carry no request context of their own. The interceptor installs a
//! [`QueryScope`] as a task-local for the duration of the downstream call;
//! [`QueryTimer::after_execute`] appends to whichever scope is active on the
//! current task. Work moved to another task must be wrapped with
//! [`QueryScope::scope`] (or carry the scope explicitly, it is also inserted
//! into the request extensions) or its queries are not attributed.

use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use xray_core::record::SqlQuery;

tokio::task_local! {
    static CURRENT_SCOPE: QueryScope;
}

/// Per-request query accumulator.
#[derive(Debug, Clone)]
pub struct QueryScope {
    request_id: Arc<str>,
    queries: Arc<Mutex<Vec<SqlQuery>>>,
}

impl QueryScope {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: Arc::from(request_id),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The scope active on the current task, if any.
    pub fn current() -> Option<QueryScope> {
        CURRENT_SCOPE.try_with(|scope| scope.clone()).ok()
    }

    /// Run `fut` with this scope active.
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT_SCOPE.scope(self, fut)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn record(&self, statement: impl Into<String>, elapsed: Duration) -> SqlQuery {
        let entry = SqlQuery::new(statement, elapsed.as_secs_f64() * 1000.0);
        trace!(request_id = %self.request_id, statement = %entry.statement, "Query recorded");
        self.lock().push(entry.clone());
        entry
    }

    /// Take every recorded query, leaving the scope empty.
    pub fn drain(&self) -> Vec<SqlQuery> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SqlQuery>> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Start/end hooks for one backing-store connection.
///
/// Call [`before_execute`](Self::before_execute) when the driver is about to
/// run a statement and [`after_execute`](Self::after_execute) when it
/// returns. The start timestamp lives on the connection, so one timer per
/// connection.
#[derive(Debug, Default)]
pub struct QueryTimer {
    query_start: Option<Instant>,
}

impl QueryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_execute(&mut self) {
        self.query_start = Some(Instant::now());
    }

    /// Record the finished statement into the task's active scope.
    ///
    /// Returns `None` when no start was recorded or no scope is active; the
    /// query is then dropped rather than attributed to another request.
    pub fn after_execute(&mut self, statement: &str, params: &[Value]) -> Option<SqlQuery> {
        let scope = QueryScope::current();
        if scope.is_none() {
            debug!(statement = %statement, "Query outside any request scope, not recorded");
        }
        self.after_execute_in(scope.as_ref()?, statement, params)
    }

    /// Same as [`after_execute`](Self::after_execute) with an explicit scope.
    pub fn after_execute_in(
        &mut self,
        scope: &QueryScope,
        statement: &str,
        params: &[Value],
    ) -> Option<SqlQuery> {
        let started = self.query_start.take()?;
        Some(scope.record(format_statement(statement, params), started.elapsed()))
    }
}

/// Substitute positional `?` placeholders with the bound values, in order.
/// Placeholders without a matching value are left as `?`.
pub fn format_statement(statement: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(statement.len() + params.len() * 8);
    let mut params = params.iter();
    for c in statement.chars() {
        if c == '?' {
            match params.next() {
                Some(v) => out.push_str(&render_param(v)),
                None => out.push('?'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn render_param(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}
