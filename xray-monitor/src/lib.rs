pub mod app;
pub mod panels;
pub mod receiver;
pub mod store;

pub use app::{MonitorApp, MonitorView, StoreEvent};
pub use panels::{Panel, PanelSet, Rendered, Tab};
pub use receiver::Receiver;
pub use store::{ListEntry, RequestStore};

/// Raw-text queue between the receiver and the store.
pub fn queue(
    capacity: usize,
) -> (
    crossbeam_channel::Sender<String>,
    crossbeam_channel::Receiver<String>,
) {
    if capacity == 0 {
        crossbeam_channel::unbounded()
    } else {
        crossbeam_channel::bounded(capacity)
    }
}
