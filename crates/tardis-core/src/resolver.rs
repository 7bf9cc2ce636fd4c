//! State resolver trait and a local stand-in implementation.
//!
//! The orchestrator never resolves conflicting state itself. For every
//! event whose predecessors are known it hands the predecessors' state maps
//! and the event to a [`StateResolver`] and caches whatever comes back. The
//! real algorithm lives in an external process reached through
//! `tardis-resolver`; tests and offline runs use [`NaiveResolver`].

use std::future::Future;
use std::sync::Arc;

use tardis_types::{MatrixEvent, RoomId, StateMap};

use crate::error::ResolveError;

/// A source of resolved state.
///
/// Implementations compute the state after `event` given the state after
/// each of its predecessors, in the event's recorded `prev_events` order.
/// Several calls may be outstanding at once.
pub trait StateResolver: Send + Sync {
    /// Resolve the state after `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the resolution could not be obtained;
    /// the caller leaves its cache untouched so the call can be retried.
    fn resolve_state(
        &self,
        room_id: &RoomId,
        room_version: &str,
        states: Vec<StateMap>,
        event: &MatrixEvent,
    ) -> impl Future<Output = Result<StateMap, ResolveError>> + Send;
}

impl<T: StateResolver> StateResolver for Arc<T> {
    fn resolve_state(
        &self,
        room_id: &RoomId,
        room_version: &str,
        states: Vec<StateMap>,
        event: &MatrixEvent,
    ) -> impl Future<Output = Result<StateMap, ResolveError>> + Send {
        T::resolve_state(self, room_id, room_version, states, event)
    }
}

/// The state contributed by an event with no predecessors: its own slot if
/// it is a state event, otherwise nothing.
pub fn base_state(event: &MatrixEvent) -> StateMap {
    event
        .state_slot()
        .map(|slot| (slot, event.event_id.clone()))
        .into_iter()
        .collect()
}

/// A resolver that merges state without any conflict resolution.
///
/// Predecessor states are overlaid in order (later predecessors win a
/// contested slot) and the event's own slot is then applied. This is not
/// Matrix state resolution: there are no auth checks and no power-level
/// ordering. It exists so the stepping and caching machinery can be run
/// without an external resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveResolver;

impl NaiveResolver {
    /// Create a new naive resolver.
    pub const fn new() -> Self {
        Self
    }
}

impl StateResolver for NaiveResolver {
    async fn resolve_state(
        &self,
        _room_id: &RoomId,
        _room_version: &str,
        states: Vec<StateMap>,
        event: &MatrixEvent,
    ) -> Result<StateMap, ResolveError> {
        let mut merged = StateMap::new();
        for state in &states {
            for (slot, winner) in state {
                merged.insert(slot.clone(), winner.clone());
            }
        }
        if let Some(slot) = event.state_slot() {
            merged.insert(slot, event.event_id.clone());
        }
        Ok(merged)
    }
}
