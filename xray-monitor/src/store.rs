use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, TryRecvError};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};
use xray_core::{TelemetryRecord, XrayError};

/// One line of the request list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub label: String,
    pub request_id: String,
    pub received_at: DateTime<Utc>,
}

/// Every retained record plus the current selection.
///
/// Owned by a single thread; the queue is the only thing shared with the
/// receiver. The list, the id map, and the selection only change together
/// through `&mut self`, so no caller can observe them out of step.
#[derive(Debug, Default)]
pub struct RequestStore {
    /// Newest first.
    entries: VecDeque<ListEntry>,
    records: HashMap<String, TelemetryRecord>,
    selected: Option<String>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One poll tick: ingest at most one queued payload.
    ///
    /// `Ok(None)` when the queue is empty. Rejected payloads are logged and
    /// returned as the error; the store is unchanged in that case.
    pub fn poll(&mut self, queue: &Receiver<String>) -> Result<Option<&ListEntry>, XrayError> {
        let text = match queue.try_recv() {
            Ok(text) => text,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => {
                debug!("Queue producer gone, nothing to poll");
                return Ok(None);
            }
        };
        self.ingest(&text).map(Some)
    }

    /// Decode, validate, and store one payload.
    pub fn ingest(&mut self, text: &str) -> Result<&ListEntry, XrayError> {
        let record = TelemetryRecord::from_json(text).inspect_err(|e| {
            warn!(kind = e.kind(), error = %e, "Record dropped");
        })?;
        if self.records.contains_key(&record.request_id) {
            let e = XrayError::Validation(format!("duplicate request_id {}", record.request_id));
            warn!(kind = e.kind(), error = %e, "Record dropped");
            return Err(e);
        }

        let entry = ListEntry {
            label: record.summary_label(self.records.len() + 1),
            request_id: record.request_id.clone(),
            received_at: Utc::now(),
        };
        info!(
            request_id = %record.request_id,
            method = %record.request.method,
            path = %record.request.path,
            "New request added"
        );
        self.records.insert(record.request_id.clone(), record);
        self.entries.push_front(entry);
        Ok(&self.entries[0])
    }

    /// Replace the selection. `None`, or an id that is not stored, leaves
    /// nothing selected.
    pub fn select(&mut self, request_id: Option<&str>) -> Option<&TelemetryRecord> {
        self.selected = match request_id {
            Some(id) if self.records.contains_key(id) => Some(id.to_string()),
            Some(id) => {
                warn!(request_id = %id, "Selected request is not stored");
                None
            }
            None => None,
        };
        let record = self.selected()?;
        info!(
            request_id = %record.request_id,
            method = %record.request.method,
            path = %record.request.path,
            "Selected request"
        );
        Some(record)
    }

    /// Select by list position, 0 being the newest entry.
    pub fn select_index(&mut self, index: usize) -> Option<&TelemetryRecord> {
        let id = self.entries.get(index).map(|e| e.request_id.clone());
        self.select(id.as_deref())
    }

    pub fn clear_all(&mut self) {
        let dropped = self.records.len();
        self.entries.clear();
        self.records.clear();
        self.selected = None;
        info!(dropped, "Cleared all requests");
    }

    pub fn selected(&self) -> Option<&TelemetryRecord> {
        self.selected.as_deref().and_then(|id| self.records.get(id))
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn get(&self, request_id: &str) -> Option<&TelemetryRecord> {
        self.records.get(request_id)
    }

    /// List entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ListEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(id: &str, method: &str, path: &str) -> String {
        json!({
            "request_id": id,
            "request": {"method": method, "path": path, "status_code": 200},
            "response": {"headers": {}, "error": null},
            "sql": [],
            "elapsed_time": "1.0000"
        })
        .to_string()
    }

    #[test]
    fn poll_on_empty_queue_is_noop() {
        let (_tx, rx) = crossbeam_channel::unbounded::<String>();
        let mut store = RequestStore::new();
        assert!(store.poll(&rx).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn poll_ingests_at_most_one_item() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(payload("a", "GET", "/a")).unwrap();
        tx.send(payload("b", "POST", "/b")).unwrap();

        let mut store = RequestStore::new();
        store.poll(&rx).unwrap();
        assert_eq!(store.len(), 1);
        store.poll(&rx).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.poll(&rx).unwrap().is_none());
    }

    #[test]
    fn newest_entry_first_with_ordinals() {
        let mut store = RequestStore::new();
        store.ingest(&payload("a", "GET", "/a")).unwrap();
        store.ingest(&payload("b", "POST", "/b")).unwrap();
        let labels: Vec<_> = store.entries().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["2. [POST] /b", "1. [GET] /a"]);
    }

    #[test]
    fn invalid_payloads_leave_store_untouched() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send("not json".to_string()).unwrap();
        tx.send(json!({"request_id": "x"}).to_string()).unwrap();
        tx.send(payload("ok", "GET", "/ok")).unwrap();

        let mut store = RequestStore::new();
        assert!(matches!(store.poll(&rx), Err(XrayError::Decode(_))));
        assert!(matches!(store.poll(&rx), Err(XrayError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(store.entries().count(), 0);

        let entry = store.poll(&rx).unwrap().unwrap();
        assert_eq!(entry.label, "1. [GET] /ok");
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let mut store = RequestStore::new();
        store.ingest(&payload("a", "GET", "/a")).unwrap();
        let err = store.ingest(&payload("a", "GET", "/again")).unwrap_err();
        assert!(matches!(err, XrayError::Validation(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().request.path, "/a");
    }

    #[test]
    fn select_replaces_previous_selection() {
        let mut store = RequestStore::new();
        store.ingest(&payload("a", "GET", "/a")).unwrap();
        store.ingest(&payload("b", "GET", "/b")).unwrap();

        assert_eq!(store.select(Some("a")).unwrap().request.path, "/a");
        assert_eq!(store.select_index(0).unwrap().request.path, "/b");
        assert_eq!(store.selected_id(), Some("b"));

        assert!(store.select(Some("missing")).is_none());
        assert!(store.selected().is_none());

        store.select(Some("a"));
        assert!(store.select(None).is_none());
        assert!(store.selected().is_none());
    }

    #[test]
    fn clear_all_empties_everything_and_restarts_ordinals() {
        let mut store = RequestStore::new();
        store.ingest(&payload("a", "GET", "/a")).unwrap();
        store.ingest(&payload("b", "GET", "/b")).unwrap();
        store.select(Some("a"));

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.entries().count(), 0);
        assert!(store.selected().is_none());
        assert!(store.get("a").is_none());

        let entry = store.ingest(&payload("c", "GET", "/c")).unwrap();
        assert_eq!(entry.label, "1. [GET] /c");
    }
}
