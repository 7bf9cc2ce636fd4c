//! Memoised state after each event.
//!
//! [`StateAtEvent`] maps an event ID to the [`StateMap`] believed to hold
//! immediately after that event is applied. Entries go from absent to
//! populated exactly once (the orchestrator is the only writer) and are
//! only dropped wholesale by [`StateAtEvent::clear`] when a new scenario
//! replaces the old one.
//!
//! An entry holding an empty map is indistinguishable from no entry: both
//! report [`StateAtEvent::has_state`] as `false`. Rooms always contain at
//! least their create event, so a legitimately empty resolved state does
//! not arise in practice, and the orchestrator's skip check relies on this.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tardis_types::{EventId, StateMap};
use tracing::debug;

/// Cache of resolved state keyed by event ID.
#[derive(Debug, Clone, Default)]
pub struct StateAtEvent {
    state: HashMap<EventId, StateMap>,
}

impl StateAtEvent {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state after `event_id`. The cache keeps its own copy.
    pub fn set_state(&mut self, event_id: EventId, state: StateMap) {
        debug!(event_id = %event_id, slots = state.len(), "state at event recorded");
        self.state.insert(event_id, state);
    }

    /// An independent copy of the state after `event_id`, or an empty map
    /// if it is not known.
    pub fn get_state(&self, event_id: &EventId) -> StateMap {
        self.state.get(event_id).cloned().unwrap_or_default()
    }

    /// The winning event IDs of the state after `event_id`, or an empty set
    /// if it is not known.
    pub fn get_state_as_event_ids(&self, event_id: &EventId) -> BTreeSet<EventId> {
        self.state
            .get(event_id)
            .map(StateMap::event_ids)
            .unwrap_or_default()
    }

    /// Whether a non-empty state is recorded for `event_id`.
    pub fn has_state(&self, event_id: &EventId) -> bool {
        self.state.get(event_id).is_some_and(|s| !s.is_empty())
    }

    /// Invert the state sets of `event_ids`.
    ///
    /// The result maps every state event found in any of the given state
    /// sets to the subset of `event_ids` whose state set contains it. The
    /// renderer uses this to draw a state event once while marking every
    /// state set it belongs to.
    pub fn get_inverse_state_for_event_ids<'a, I>(
        &self,
        event_ids: I,
    ) -> BTreeMap<EventId, BTreeSet<EventId>>
    where
        I: IntoIterator<Item = &'a EventId>,
    {
        let mut inverse: BTreeMap<EventId, BTreeSet<EventId>> = BTreeMap::new();
        for id in event_ids {
            for state_event_id in self.get_state_as_event_ids(id) {
                inverse.entry(state_event_id).or_default().insert(id.clone());
            }
        }
        inverse
    }

    /// Number of events with a recorded entry (empty or not).
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.state.clear();
    }
}
