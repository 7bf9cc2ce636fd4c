//! One loaded scenario and everything derived from it.
//!
//! A [`Session`] owns a fresh event store, a fresh state-at-event cache,
//! the timeline cursor, and the orchestrator. Loading another scenario
//! means building another `Session`; nothing carries over between them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tardis_types::{EventId, StateMap};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cursor::TimelineCursor;
use crate::error::CoreError;
use crate::event_store::EventStore;
use crate::orchestrator::{Orchestrator, ResolveSummary};
use crate::resolver::StateResolver;
use crate::scenario::Scenario;
use crate::state_at_event::StateAtEvent;

/// A scenario loaded for stepping and resolution.
#[derive(Debug)]
pub struct Session<R> {
    scenario: Scenario,
    store: Arc<EventStore>,
    cursor: TimelineCursor,
    orchestrator: Orchestrator<R>,
    create_event_id: Option<EventId>,
}

impl<R: StateResolver> Session<R> {
    /// Load `scenario` with a resolver that does not need the event store.
    pub fn load(scenario: Scenario, resolver: R) -> Self {
        Self::load_with(scenario, |_| resolver)
    }

    /// Load `scenario`, building the resolver from the session's event
    /// store (the remote resolver serves `get_event` requests from it).
    pub fn load_with<F>(scenario: Scenario, make_resolver: F) -> Self
    where
        F: FnOnce(Arc<EventStore>) -> R,
    {
        let mut store = EventStore::new();
        let mut create_event_id = None;
        for event in &scenario.events {
            if event.is_create() {
                create_event_id = Some(event.event_id.clone());
            }
            store.store(event.clone());
        }

        let cache = seed_cache(&scenario, &store);
        let seeded = cache.len();

        let mut cursor = TimelineCursor::new(scenario.ordering());
        if let Some(second) = scenario.events.get(1).filter(|_| scenario.on_load_at_start) {
            cursor.go_to(&second.event_id);
        }

        let store = Arc::new(store);
        let resolver = make_resolver(Arc::clone(&store));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::new(RwLock::new(cache)),
            resolver,
            scenario.room_version.clone(),
        );

        info!(
            room_id = %scenario.room_id,
            events = store.len(),
            precalculated = seeded,
            current = ?cursor.current(),
            "session loaded"
        );

        Self {
            scenario,
            store,
            cursor,
            orchestrator,
            create_event_id,
        }
    }

    /// Step the cursor forward one event.
    pub fn next(&mut self) {
        self.cursor.next();
    }

    /// Step the cursor back one event.
    pub fn previous(&mut self) {
        self.cursor.previous();
    }

    /// Move the cursor to `event_id`; unknown IDs leave it in place.
    pub fn go_to(&mut self, event_id: &EventId) -> bool {
        self.cursor.go_to(event_id)
    }

    /// The event under the cursor.
    pub fn current(&self) -> Option<&EventId> {
        self.cursor.current()
    }

    /// The cursor itself.
    pub const fn cursor(&self) -> &TimelineCursor {
        &self.cursor
    }

    /// Resolve state for every event up to the cursor.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::resolve`].
    pub async fn resolve(&self) -> Result<ResolveSummary, CoreError> {
        self.orchestrator.resolve(&self.cursor).await
    }

    /// The winning event IDs of the state after `event_id`.
    pub async fn state_as_event_ids(&self, event_id: &EventId) -> BTreeSet<EventId> {
        self.orchestrator
            .cache()
            .read()
            .await
            .get_state_as_event_ids(event_id)
    }

    /// The full state map after `event_id`, empty if unresolved.
    pub async fn state_at(&self, event_id: &EventId) -> StateMap {
        self.orchestrator.cache().read().await.get_state(event_id)
    }

    /// Inverse state-set view over `event_ids`: each state event mapped to
    /// the given events whose state contains it.
    pub async fn inverse_state<'a, I>(&self, event_ids: I) -> BTreeMap<EventId, BTreeSet<EventId>>
    where
        I: IntoIterator<Item = &'a EventId>,
    {
        self.orchestrator
            .cache()
            .read()
            .await
            .get_inverse_state_for_event_ids(event_ids)
    }

    /// The label attached to `event_id`, if any.
    pub fn annotation_for(&self, event_id: &EventId) -> Option<&str> {
        self.scenario
            .annotations
            .events
            .get(event_id)
            .map(String::as_str)
    }

    /// The graph title for the current position: the per-event title if
    /// one exists, otherwise the scenario title.
    pub fn title(&self) -> Option<&str> {
        self.current()
            .and_then(|id| self.scenario.annotations.titles.get(id))
            .or(self.scenario.annotations.title.as_ref())
            .map(String::as_str)
    }

    /// The room's `m.room.create` event, if the scenario has one.
    pub const fn create_event_id(&self) -> Option<&EventId> {
        self.create_event_id.as_ref()
    }

    /// The event store backing this session.
    pub const fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// The loaded scenario.
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// The resolver this session resolves through.
    pub const fn resolver(&self) -> &R {
        self.orchestrator.resolver()
    }
}

/// Build the initial cache from the scenario's precalculated state.
fn seed_cache(scenario: &Scenario, store: &EventStore) -> StateAtEvent {
    let mut cache = StateAtEvent::new();
    for (at_event, state_event_ids) in &scenario.precalculated_state_after {
        if !store.contains(at_event) {
            warn!(
                event_id = %at_event,
                "precalculated_state_after names an event that is not in the scenario, skipping"
            );
            continue;
        }
        let mut state = StateMap::new();
        for state_event_id in state_event_ids {
            let Some(slot) = store.get(state_event_id).and_then(|e| e.state_slot()) else {
                warn!(
                    event_id = %at_event,
                    state_event_id = %state_event_id,
                    "precalculated state includes an event that is not a known state event, skipping"
                );
                continue;
            };
            state.insert(slot, state_event_id.clone());
        }
        cache.set_state(at_event.clone(), state);
    }
    cache
}
