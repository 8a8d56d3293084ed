//! Request/response field extraction and single-consumption body capture.

use axum::body::{Body, HttpBody};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use http::HeaderMap;
use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::request::Parts;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use xray_core::XrayError;

/// How a request body is captured, decided from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    /// Anything else passes through untouched and is not recorded.
    Opaque,
}

impl BodyKind {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match mime.as_str() {
            "application/json" => BodyKind::Json,
            "application/x-www-form-urlencoded" => BodyKind::Form,
            _ => BodyKind::Opaque,
        }
    }

    /// Turn captured bytes into the record's `body` value.
    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        match self {
            BodyKind::Json => {
                if bytes.is_empty() {
                    return None;
                }
                Some(
                    serde_json::from_slice(bytes).unwrap_or_else(|_| {
                        Value::String(String::from_utf8_lossy(bytes).into_owned())
                    }),
                )
            }
            BodyKind::Form => Some(Value::Object(parse_form(bytes))),
            BodyKind::Opaque => None,
        }
    }
}

/// Read a body up to `limit` bytes and hand back an equivalent body for the
/// downstream.
///
/// Frames are buffered until the stream ends or the running total passes
/// `limit`. Past the limit the downstream gets the buffered prefix followed by
/// the unread remainder and the result is `Ok(None)`. A read failure is
/// replayed to the downstream after the prefix and reported as `Err`.
pub async fn rebuffer(body: Body, limit: usize) -> (Body, Result<Option<Bytes>, XrayError>) {
    if body.size_hint().lower() > limit as u64 {
        return (body, Ok(None));
    }
    let mut frames = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) if buf.len() + chunk.len() > limit => {
                let head = stream::iter([Ok(buf.freeze()), Ok(chunk)]);
                return (Body::from_stream(head.chain(frames)), Ok(None));
            }
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(e) => {
                let reason = format!("body read failed: {e}");
                let replay = stream::iter([Ok(buf.freeze()), Err(e)]);
                return (Body::from_stream(replay), Err(XrayError::Capture(reason)));
            }
        }
    }
    let bytes = buf.freeze();
    (Body::from(bytes.clone()), Ok(Some(bytes)))
}

/// Capture the request body if its content type is recorded.
pub async fn capture_request_body(
    body: Body,
    kind: BodyKind,
    limit: usize,
) -> (Body, Result<Option<Value>, XrayError>) {
    if kind == BodyKind::Opaque {
        return (body, Ok(None));
    }
    let (body, bytes) = rebuffer(body, limit).await;
    let value = bytes.map(|b| b.and_then(|b| kind.decode(&b)));
    (body, value)
}

/// Flatten `a=1&b=two` into a JSON object. Repeated keys keep the last value.
pub fn parse_form(bytes: &[u8]) -> Map<String, Value> {
    let text = String::from_utf8_lossy(bytes);
    parse_pairs(&text)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

pub fn parse_query(query: Option<&str>) -> BTreeMap<String, Value> {
    parse_pairs(query.unwrap_or_default())
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

fn parse_pairs(text: &str) -> Vec<(String, String)> {
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode(k), form_decode(v))
        })
        .collect()
}

fn form_decode(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|c| c.into_owned())
        .unwrap_or(s)
}

/// Header names lower-cased; repeated headers joined with `, `.
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

pub fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            let v = v.trim().trim_matches('"');
            let v = urlencoding::decode(v)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| v.to_string());
            Some((k.trim().to_string(), v))
        })
        .collect()
}

/// `<scheme>://<host>/` as seen by the service.
pub fn base_url(parts: &Parts) -> String {
    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.scheme_str())
        .unwrap_or("http");
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use http::{HeaderValue, Request};
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn body_kind_ignores_charset_parameter() {
        let h = headers(&[("content-type", "application/json; charset=utf-8")]);
        assert_eq!(BodyKind::from_headers(&h), BodyKind::Json);
        let h = headers(&[("content-type", "application/x-www-form-urlencoded")]);
        assert_eq!(BodyKind::from_headers(&h), BodyKind::Form);
        let h = headers(&[("content-type", "multipart/form-data; boundary=x")]);
        assert_eq!(BodyKind::from_headers(&h), BodyKind::Opaque);
        assert_eq!(BodyKind::from_headers(&HeaderMap::new()), BodyKind::Opaque);
    }

    #[test]
    fn json_decode_falls_back_to_text() {
        assert_eq!(BodyKind::Json.decode(br#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(BodyKind::Json.decode(b"{oops"), Some(json!("{oops")));
        assert_eq!(BodyKind::Json.decode(b""), None);
        assert_eq!(BodyKind::Opaque.decode(b"raw"), None);
    }

    #[test]
    fn form_is_flattened_and_decoded() {
        let form = parse_form(b"name=Jane+Doe&city=S%C3%A3o%20Paulo&empty=&flag");
        assert_eq!(form.get("name"), Some(&json!("Jane Doe")));
        assert_eq!(form.get("city"), Some(&json!("São Paulo")));
        assert_eq!(form.get("empty"), Some(&json!("")));
        assert_eq!(form.get("flag"), Some(&json!("")));
    }

    #[test]
    fn query_parsing_handles_missing_query() {
        assert!(parse_query(None).is_empty());
        let q = parse_query(Some("page=2&q=a%26b"));
        assert_eq!(q.get("page"), Some(&json!("2")));
        assert_eq!(q.get("q"), Some(&json!("a&b")));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let h = headers(&[("accept", "text/html"), ("accept", "application/json")]);
        let map = header_map(&h);
        assert_eq!(map.get("accept").unwrap(), "text/html, application/json");
    }

    #[test]
    fn cookies_are_split_across_headers() {
        let h = headers(&[("cookie", "a=1; b=\"two\""), ("cookie", "c=x%20y")]);
        let cookies = parse_cookies(&h);
        assert_eq!(cookies.get("a").unwrap(), "1");
        assert_eq!(cookies.get("b").unwrap(), "two");
        assert_eq!(cookies.get("c").unwrap(), "x y");
    }

    #[test]
    fn base_url_prefers_forwarded_proto() {
        let (parts, _) = Request::builder()
            .uri("/items?x=1")
            .header("host", "api.local:8000")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(base_url(&parts), "https://api.local:8000/");
    }

    #[tokio::test]
    async fn rebuffer_preserves_body_for_downstream() {
        let (body, captured) = rebuffer(Body::from("hello"), 1024).await;
        assert_eq!(captured.unwrap().unwrap(), Bytes::from("hello"));
        let replay = to_bytes(body, 1024).await.unwrap();
        assert_eq!(replay, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn rebuffer_skips_oversized_body() {
        let (body, captured) = rebuffer(Body::from("0123456789"), 4).await;
        assert!(captured.unwrap().is_none());
        let replay = to_bytes(body, 1024).await.unwrap();
        assert_eq!(replay.len(), 10);
    }

    fn chunked(parts: &[&'static str]) -> Body {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn rebuffer_reads_body_of_unknown_length() {
        let body = chunked(&["{\"a\"", ":1}"]);
        assert!(body.size_hint().upper().is_none());
        let (body, captured) = rebuffer(body, 1024).await;
        assert_eq!(captured.unwrap().unwrap(), Bytes::from(r#"{"a":1}"#));
        assert_eq!(to_bytes(body, 1024).await.unwrap(), Bytes::from(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn rebuffer_replays_prefix_when_stream_runs_past_limit() {
        let (body, captured) = rebuffer(chunked(&["0123", "4567", "89"]), 6).await;
        assert!(captured.unwrap().is_none());
        let replay = to_bytes(body, 1024).await.unwrap();
        assert_eq!(replay, Bytes::from("0123456789"));
    }

    #[tokio::test]
    async fn rebuffer_reports_read_failure_after_prefix() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ];
        let (body, captured) = rebuffer(Body::from_stream(stream::iter(chunks)), 1024).await;
        match captured {
            Err(XrayError::Capture(reason)) => assert!(reason.contains("connection reset")),
            other => panic!("expected capture error, got {other:?}"),
        }
        assert!(to_bytes(body, 1024).await.is_err());
    }

    #[tokio::test]
    async fn form_body_is_captured_and_replayed() {
        let (body, value) =
            capture_request_body(Body::from("a=1&b=2"), BodyKind::Form, 1024).await;
        assert_eq!(value.unwrap(), Some(json!({"a": "1", "b": "2"})));
        assert_eq!(to_bytes(body, 1024).await.unwrap(), Bytes::from("a=1&b=2"));
    }
}
