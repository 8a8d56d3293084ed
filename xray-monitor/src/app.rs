//! Monitor state: store, panels, and the listeners that draw them.
//!
//! Everything here runs on one cooperative loop. Each operation mutates the
//! store, re-renders the panels if the selection may have changed, then
//! calls every subscriber with the event and the new view, in that order.

use crate::panels::{PanelSet, Rendered};
use crate::store::{ListEntry, RequestStore};
use crossbeam_channel::Receiver;
use xray_core::TelemetryRecord;

/// What changed in the last operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Ingested { request_id: String, label: String },
    Dropped { kind: &'static str, reason: String },
    Selected { request_id: Option<String> },
    Cleared,
}

/// Read-only view handed to subscribers.
pub struct MonitorView<'a> {
    store: &'a RequestStore,
    panels: &'a [Rendered],
}

impl<'a> MonitorView<'a> {
    pub fn entries(&self) -> impl Iterator<Item = &'a ListEntry> + 'a {
        self.store.entries()
    }

    pub fn selected(&self) -> Option<&'a TelemetryRecord> {
        self.store.selected()
    }

    pub fn panels(&self) -> &'a [Rendered] {
        self.panels
    }
}

type Subscriber = Box<dyn FnMut(&StoreEvent, &MonitorView<'_>)>;

pub struct MonitorApp {
    store: RequestStore,
    panels: PanelSet,
    rendered: Vec<Rendered>,
    queue: Receiver<String>,
    subscribers: Vec<Subscriber>,
}

impl MonitorApp {
    pub fn new(queue: Receiver<String>) -> Self {
        let panels = PanelSet::new();
        let rendered = panels.render_all(None);
        Self {
            store: RequestStore::new(),
            panels,
            rendered,
            queue,
            subscribers: Vec::new(),
        }
    }

    /// Register a listener called after every state change.
    pub fn subscribe<F>(&mut self, f: F)
    where
        F: FnMut(&StoreEvent, &MonitorView<'_>) + 'static,
    {
        self.subscribers.push(Box::new(f));
    }

    /// One poll tick. Returns `None` when the queue was empty.
    pub fn tick(&mut self) -> Option<StoreEvent> {
        let event = match self.store.poll(&self.queue) {
            Ok(None) => return None,
            Ok(Some(entry)) => StoreEvent::Ingested {
                request_id: entry.request_id.clone(),
                label: entry.label.clone(),
            },
            Err(e) => StoreEvent::Dropped {
                kind: e.kind(),
                reason: e.to_string(),
            },
        };
        self.notify(&event);
        Some(event)
    }

    /// Operator refresh: an immediate extra tick.
    pub fn refresh(&mut self) -> Option<StoreEvent> {
        self.tick()
    }

    pub fn select(&mut self, request_id: Option<&str>) -> StoreEvent {
        let selected = self.store.select(request_id).map(|r| r.request_id.clone());
        self.rerender();
        let event = StoreEvent::Selected {
            request_id: selected,
        };
        self.notify(&event);
        event
    }

    /// Select by list position, 0 being the newest entry.
    pub fn select_index(&mut self, index: usize) -> StoreEvent {
        let id = self.store.entries().nth(index).map(|e| e.request_id.clone());
        self.select(id.as_deref())
    }

    pub fn clear_all(&mut self) -> StoreEvent {
        self.store.clear_all();
        self.rerender();
        let event = StoreEvent::Cleared;
        self.notify(&event);
        event
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn panels(&self) -> &PanelSet {
        &self.panels
    }

    pub fn rendered(&self) -> &[Rendered] {
        &self.rendered
    }

    pub fn view(&self) -> MonitorView<'_> {
        MonitorView {
            store: &self.store,
            panels: &self.rendered,
        }
    }

    fn rerender(&mut self) {
        self.rendered = self.panels.render_all(self.store.selected());
    }

    fn notify(&mut self, event: &StoreEvent) {
        let view = MonitorView {
            store: &self.store,
            panels: &self.rendered,
        };
        for subscriber in &mut self.subscribers {
            subscriber(event, &view);
        }
    }
}
