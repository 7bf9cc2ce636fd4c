//! Append-only, content-addressed event storage.
//!
//! The scenario loader writes every event into an [`EventStore`] once, after
//! which the store is shared read-only (behind an [`Arc`])
//! between the orchestrator and the resolver transport, which answers the
//! resolver's `get_event` requests from it.

use std::collections::HashMap;
use std::sync::Arc;

use tardis_types::{EventId, MatrixEvent};

/// Lookup of events by ID.
///
/// The resolver transport depends on this trait rather than on
/// [`EventStore`] so tests can serve events from anywhere.
pub trait EventSource: Send + Sync {
    /// The event with the given ID, if known.
    fn get_event(&self, event_id: &EventId) -> Option<MatrixEvent>;
}

/// In-memory map from event ID to event.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: HashMap<EventId, MatrixEvent>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event keyed by its ID. Storing the same ID again replaces
    /// the earlier record.
    pub fn store(&mut self, event: MatrixEvent) {
        self.events.insert(event.event_id.clone(), event);
    }

    /// Look up an event. Absence is an ordinary outcome.
    pub fn get(&self, event_id: &EventId) -> Option<&MatrixEvent> {
        self.events.get(event_id)
    }

    /// Whether an event with this ID is stored.
    pub fn contains(&self, event_id: &EventId) -> bool {
        self.events.contains_key(event_id)
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for EventStore {
    fn get_event(&self, event_id: &EventId) -> Option<MatrixEvent> {
        self.get(event_id).cloned()
    }
}

impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn get_event(&self, event_id: &EventId) -> Option<MatrixEvent> {
        (**self).get_event(event_id)
    }
}

impl FromIterator<MatrixEvent> for EventStore {
    fn from_iter<I: IntoIterator<Item = MatrixEvent>>(iter: I) -> Self {
        let mut store = Self::new();
        for event in iter {
            store.store(event);
        }
        store
    }
}
