//! Request registry and the completion reporter.
//!
//! Each accepted request gets a slot in a concurrent map keyed by request id.
//! The worker mutates the slot's handle; readers only ever get cloned
//! snapshots. The reporter is the whole polling surface: status, the boolean
//! "did it finish" acknowledgement, and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::handle::{Counts, ReindexHandle, ReindexState};

#[derive(Debug)]
pub(crate) struct RequestSlot {
    handle: Mutex<ReindexHandle>,
    cancelled: AtomicBool,
}

impl RequestSlot {
    pub(crate) fn new(id: Uuid) -> Self {
        Self {
            handle: Mutex::new(ReindexHandle::new(id)),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn snapshot(&self) -> ReindexHandle {
        self.handle.lock().expect("handle lock").clone()
    }

    pub(crate) fn update(&self, mutate: impl FnOnce(&mut ReindexHandle)) {
        mutate(&mut self.handle.lock().expect("handle lock"));
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn cancel(&self) -> bool {
        let was_running = !self.snapshot().is_terminal();
        self.cancelled.store(true, Ordering::Relaxed);
        was_running
    }
}

pub(crate) type Registry = Arc<DashMap<Uuid, Arc<RequestSlot>>>;

/// Read-only (plus cancel) view over the request registry.
#[derive(Debug, Clone)]
pub struct CompletionReporter {
    registry: Registry,
}

impl CompletionReporter {
    pub(crate) fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Current snapshot of a request, or `None` for an unknown id.
    pub fn status(&self, id: Uuid) -> Option<ReindexHandle> {
        self.registry.get(&id).map(|slot| slot.snapshot())
    }

    /// True once the request reached `Completed` or `Failed`, regardless of
    /// whether every individual document succeeded. Unknown ids are false.
    pub fn acknowledge(&self, id: Uuid) -> bool {
        self.status(id).is_some_and(|handle| handle.is_terminal())
    }

    /// Stops a running request from issuing new scroll or bulk operations.
    /// Already-written batches stay. Returns false for unknown or already
    /// terminal requests.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.registry
            .get(&id)
            .map(|slot| slot.cancel())
            .unwrap_or(false)
    }
}

/// The structured acknowledgement returned at the request boundary.
///
/// `name` is always serialized and always null; callers at the boundary
/// depend on it being absent-as-null.
#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub acknowledged: bool,
    pub name: Option<String>,
    pub request_id: Uuid,
    pub state: ReindexState,
    pub counts: Counts,
}

impl Acknowledgement {
    /// Synchronous callers acknowledge a terminal handle; asynchronous
    /// callers acknowledge acceptance and poll for the rest.
    pub fn of(handle: &ReindexHandle, waited: bool) -> Self {
        Self {
            acknowledged: if waited { handle.is_terminal() } else { true },
            name: None,
            request_id: handle.id,
            state: handle.state,
            counts: handle.counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_slot() -> (Registry, Uuid) {
        let registry: Registry = Arc::new(DashMap::new());
        let id = Uuid::new_v4();
        registry.insert(id, Arc::new(RequestSlot::new(id)));
        (registry, id)
    }

    #[test]
    fn acknowledge_flips_only_on_terminal_state() {
        let (registry, id) = registry_with_slot();
        let reporter = CompletionReporter::new(registry.clone());
        assert!(!reporter.acknowledge(id));

        registry.get(&id).unwrap().update(|handle| handle.complete());
        assert!(reporter.acknowledge(id));
        assert!(!reporter.acknowledge(Uuid::new_v4()));
    }

    #[test]
    fn cancel_reports_whether_the_request_was_still_running() {
        let (registry, id) = registry_with_slot();
        let reporter = CompletionReporter::new(registry.clone());
        assert!(reporter.cancel(id));
        assert!(registry.get(&id).unwrap().is_cancelled());

        registry.get(&id).unwrap().update(|handle| handle.fail("x".into()));
        assert!(!reporter.cancel(id));
        assert!(!reporter.cancel(Uuid::new_v4()));
    }

    #[test]
    fn acknowledgement_payload_always_carries_a_null_name() {
        let handle = ReindexHandle::new(Uuid::new_v4());
        let payload = serde_json::to_value(Acknowledgement::of(&handle, false)).unwrap();
        assert!(payload.as_object().unwrap().contains_key("name"));
        assert!(payload["name"].is_null());
        assert_eq!(payload["acknowledged"], true);
    }

    #[test]
    fn sync_acknowledgement_requires_a_terminal_handle() {
        let mut handle = ReindexHandle::new(Uuid::new_v4());
        assert!(!Acknowledgement::of(&handle, true).acknowledged);
        handle.complete();
        assert!(Acknowledgement::of(&handle, true).acknowledged);
    }
}
