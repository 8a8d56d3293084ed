//! Projections of the selected record into display text.
//!
//! Panels are a closed, ordered set built once by [`PanelSet::new`]. They
//! hold no state: every render starts from the record alone, so re-rendering
//! after a selection change can never show stale text.

use std::fmt;
use xray_core::TelemetryRecord;
use xray_core::record::{ELAPSED_NOT_AVAILABLE, ErrorFormat, pretty_json};

pub const NO_REQUEST_SELECTED: &str = "No request selected!";
pub const NO_SQL_QUERIES: &str = "-- No SQL Queries Found! --";
const EMPTY_JSON: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Request,
    Response,
    Sql,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Request => "request",
            Tab::Response => "response",
            Tab::Sql => "sql",
        }
    }

    pub fn all() -> &'static [Tab] {
        &[Tab::Request, Tab::Response, Tab::Sql]
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Syntax the rendered body should be highlighted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexer {
    Json,
    Text,
    Sql,
}

impl Lexer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lexer::Json => "json",
            Lexer::Text => "txt",
            Lexer::Sql => "sql",
        }
    }
}

impl From<ErrorFormat> for Lexer {
    fn from(f: ErrorFormat) -> Self {
        match f {
            ErrorFormat::Json => Lexer::Json,
            ErrorFormat::Text => Lexer::Text,
        }
    }
}

/// A panel's output for one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub panel: &'static str,
    pub title: &'static str,
    pub tab: Tab,
    pub lexer: Lexer,
    pub body: String,
}

/// One view over a record.
pub trait Panel: Send + Sync {
    /// Stable identifier, e.g. `"sql"`.
    fn id(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn tab(&self) -> Tab;

    /// Display text for `record`, or the panel's placeholder when nothing
    /// is selected.
    fn parse(&self, record: Option<&TelemetryRecord>) -> String;

    fn lexer(&self, _record: Option<&TelemetryRecord>) -> Lexer {
        Lexer::Json
    }

    fn render(&self, record: Option<&TelemetryRecord>) -> Rendered {
        Rendered {
            panel: self.id(),
            title: self.title(),
            tab: self.tab(),
            lexer: self.lexer(record),
            body: self.parse(record),
        }
    }
}

fn json_or_empty<T: serde::Serialize>(value: Option<&T>) -> String {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .map(|v| pretty_json(&v))
        .unwrap_or_else(|| EMPTY_JSON.to_string())
}

// ── Request tab ───────────────────────────────────────────────

pub struct RequestDetails;

impl Panel for RequestDetails {
    fn id(&self) -> &'static str {
        "details"
    }
    fn title(&self) -> &'static str {
        "Details"
    }
    fn tab(&self) -> Tab {
        Tab::Request
    }
    fn lexer(&self, _record: Option<&TelemetryRecord>) -> Lexer {
        Lexer::Text
    }

    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        let Some(r) = record else {
            return NO_REQUEST_SELECTED.to_string();
        };
        let elapsed = if r.elapsed_time == ELAPSED_NOT_AVAILABLE {
            ELAPSED_NOT_AVAILABLE.to_string()
        } else {
            format!("{} ms", r.elapsed_time)
        };
        format!(
            "{}\t{}\t{}\t{}",
            r.request.status_code, r.request.method, r.request.path, elapsed
        )
    }
}

pub struct RequestBody;

impl Panel for RequestBody {
    fn id(&self) -> &'static str {
        "body"
    }
    fn title(&self) -> &'static str {
        "Body"
    }
    fn tab(&self) -> Tab {
        Tab::Request
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        json_or_empty(record.and_then(|r| r.request.body.as_ref()))
    }
}

pub struct QueryParams;

impl Panel for QueryParams {
    fn id(&self) -> &'static str {
        "query_params"
    }
    fn title(&self) -> &'static str {
        "Query Params"
    }
    fn tab(&self) -> Tab {
        Tab::Request
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        json_or_empty(record.map(|r| &r.request.query_params))
    }
}

pub struct Headers;

impl Panel for Headers {
    fn id(&self) -> &'static str {
        "headers"
    }
    fn title(&self) -> &'static str {
        "Headers"
    }
    fn tab(&self) -> Tab {
        Tab::Request
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        json_or_empty(record.map(|r| &r.request.headers))
    }
}

pub struct Cookies;

impl Panel for Cookies {
    fn id(&self) -> &'static str {
        "cookies"
    }
    fn title(&self) -> &'static str {
        "Cookies"
    }
    fn tab(&self) -> Tab {
        Tab::Request
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        json_or_empty(record.map(|r| &r.request.cookies))
    }
}

// ── Response tab ──────────────────────────────────────────────

pub struct ResponseHeaders;

impl Panel for ResponseHeaders {
    fn id(&self) -> &'static str {
        "response_headers"
    }
    fn title(&self) -> &'static str {
        "Headers"
    }
    fn tab(&self) -> Tab {
        Tab::Response
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        json_or_empty(record.map(|r| &r.response.headers))
    }
}

/// Error body of a failed response: pretty JSON when the message parses as
/// JSON, the raw text otherwise. Empty when there was no error.
pub struct ResponseError;

impl Panel for ResponseError {
    fn id(&self) -> &'static str {
        "error"
    }
    fn title(&self) -> &'static str {
        "Error"
    }
    fn tab(&self) -> Tab {
        Tab::Response
    }
    fn lexer(&self, record: Option<&TelemetryRecord>) -> Lexer {
        record
            .and_then(|r| r.response.error.as_ref())
            .map(|e| Lexer::from(e.format()))
            .unwrap_or(Lexer::Text)
    }
    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        record
            .and_then(|r| r.response.error.as_ref())
            .map(|e| e.display_text())
            .unwrap_or_default()
    }
}

// ── SQL tab ───────────────────────────────────────────────────

pub struct Sql;

impl Panel for Sql {
    fn id(&self) -> &'static str {
        "sql"
    }
    fn title(&self) -> &'static str {
        "SQL Queries"
    }
    fn tab(&self) -> Tab {
        Tab::Sql
    }
    fn lexer(&self, _record: Option<&TelemetryRecord>) -> Lexer {
        Lexer::Sql
    }

    fn parse(&self, record: Option<&TelemetryRecord>) -> String {
        let queries = match record {
            Some(r) if !r.sql.is_empty() => &r.sql,
            _ => return NO_SQL_QUERIES.to_string(),
        };
        let entries: Vec<String> = queries
            .iter()
            .enumerate()
            .map(|(i, q)| {
                format!(
                    "-- [{}] Took {} ms\n{}",
                    i + 1,
                    q.execution_time,
                    q.statement
                )
            })
            .collect();
        format!(
            "-- Total {} SQL queries ran\n\n{}",
            queries.len(),
            entries.join("\n\n")
        )
    }
}

// ── Set ───────────────────────────────────────────────────────

/// The fixed panel layout, grouped by tab in display order.
pub struct PanelSet {
    tabs: Vec<(Tab, Vec<Box<dyn Panel>>)>,
}

impl PanelSet {
    pub fn new() -> Self {
        Self {
            tabs: vec![
                (
                    Tab::Request,
                    vec![
                        Box::new(RequestDetails) as Box<dyn Panel>,
                        Box::new(RequestBody),
                        Box::new(QueryParams),
                        Box::new(Headers),
                        Box::new(Cookies),
                    ],
                ),
                (
                    Tab::Response,
                    vec![Box::new(ResponseHeaders) as Box<dyn Panel>, Box::new(ResponseError)],
                ),
                (Tab::Sql, vec![Box::new(Sql) as Box<dyn Panel>]),
            ],
        }
    }

    /// Every panel, tab by tab.
    pub fn panels(&self) -> impl Iterator<Item = &dyn Panel> {
        self.tabs
            .iter()
            .flat_map(|(_, panels)| panels.iter().map(|p| p.as_ref()))
    }

    pub fn tab(&self, tab: Tab) -> impl Iterator<Item = &dyn Panel> {
        self.tabs
            .iter()
            .filter(move |(t, _)| *t == tab)
            .flat_map(|(_, panels)| panels.iter().map(|p| p.as_ref()))
    }

    /// Evaluate every panel against `record`.
    pub fn render_all(&self, record: Option<&TelemetryRecord>) -> Vec<Rendered> {
        self.panels().map(|p| p.render(record)).collect()
    }

    pub fn len(&self) -> usize {
        self.tabs.iter().map(|(_, panels)| panels.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PanelSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Body text of the panel `id` in a render pass.
pub fn body_of<'a>(rendered: &'a [Rendered], id: &str) -> Option<&'a str> {
    rendered
        .iter()
        .find(|r| r.panel == id)
        .map(|r| r.body.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn record(extra: Value) -> TelemetryRecord {
        let mut base = json!({
            "request_id": "abc",
            "request": {
                "method": "GET",
                "path": "/x",
                "status_code": 200,
                "headers": {"host": "localhost"},
                "query_params": {"q": "1"},
                "cookies": {"session": "s1"}
            },
            "response": {"headers": {"content-type": "application/json"}, "error": null},
            "sql": [],
            "elapsed_time": "12.3456"
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn layout_is_fixed_and_ordered() {
        let set = PanelSet::new();
        let ids: Vec<_> = set.panels().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            [
                "details",
                "body",
                "query_params",
                "headers",
                "cookies",
                "response_headers",
                "error",
                "sql"
            ]
        );
        assert_eq!(set.tab(Tab::Response).count(), 2);
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn null_selection_renders_placeholders() {
        let rendered = PanelSet::new().render_all(None);
        assert_eq!(rendered.len(), 8);
        assert_eq!(body_of(&rendered, "details"), Some(NO_REQUEST_SELECTED));
        for id in ["body", "query_params", "headers", "cookies", "response_headers"] {
            assert_eq!(body_of(&rendered, id), Some("{}"), "panel {id}");
        }
        assert_eq!(body_of(&rendered, "error"), Some(""));
        assert_eq!(body_of(&rendered, "sql"), Some(NO_SQL_QUERIES));
    }

    #[test]
    fn details_shows_status_method_path_and_elapsed() {
        let text = RequestDetails.parse(Some(&record(json!({}))));
        assert_eq!(text, "200\tGET\t/x\t12.3456 ms");

        let failed = record(json!({"elapsed_time": "N/A"}));
        assert!(RequestDetails.parse(Some(&failed)).ends_with("\tN/A"));
    }

    #[test]
    fn json_panels_pretty_print_their_fields() {
        let r = record(json!({}));
        assert_eq!(Headers.parse(Some(&r)), "{\n  \"host\": \"localhost\"\n}");
        assert_eq!(QueryParams.parse(Some(&r)), "{\n  \"q\": \"1\"\n}");
        assert_eq!(Cookies.parse(Some(&r)), "{\n  \"session\": \"s1\"\n}");
        assert_eq!(
            ResponseHeaders.parse(Some(&r)),
            "{\n  \"content-type\": \"application/json\"\n}"
        );
        // No body captured.
        assert_eq!(RequestBody.parse(Some(&r)), "{}");
    }

    #[test]
    fn sql_entries_are_commented_and_separated() {
        let r = record(json!({"sql": [
            {"statement": "SELECT 1", "execution_time": "0.5000"},
            {"statement": "SELECT 2", "execution_time": "1.2500"}
        ]}));
        assert_eq!(
            Sql.parse(Some(&r)),
            "-- Total 2 SQL queries ran\n\n\
             -- [1] Took 0.5000 ms\nSELECT 1\n\n\
             -- [2] Took 1.2500 ms\nSELECT 2"
        );
        assert_eq!(Sql.parse(Some(&record(json!({})))), NO_SQL_QUERIES);
    }

    #[test]
    fn error_panel_picks_json_or_text() {
        let structured = record(json!({"response": {
            "headers": {},
            "error": {"message": {"detail": "Item not found"}}
        }}));
        let rendered = ResponseError.render(Some(&structured));
        assert_eq!(rendered.lexer, Lexer::Json);
        assert_eq!(rendered.body, "{\n  \"detail\": \"Item not found\"\n}");

        let text = record(json!({"response": {
            "headers": {},
            "error": {"message": "division by zero"}
        }}));
        let rendered = ResponseError.render(Some(&text));
        assert_eq!(rendered.lexer, Lexer::Text);
        assert_eq!(rendered.body, "division by zero");

        let none = ResponseError.render(Some(&record(json!({}))));
        assert_eq!(none.body, "");
    }
}
