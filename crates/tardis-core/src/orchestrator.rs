//! Incremental state resolution over a timeline prefix.
//!
//! [`Orchestrator::resolve`] makes sure the state-at-event cache holds an
//! entry for every event in the cursor's prefix. Events are visited in
//! chronological order and each result is cached before the next event is
//! looked at, so any predecessor that is itself part of the prefix has
//! already been resolved by the time its successor needs it. This relies
//! on the scenario listing events in an order consistent with the DAG.
//!
//! # Per-event steps
//!
//! 1. Skip if the cache already holds a non-empty state.
//! 2. Fetch the event from the store (absence aborts the call).
//! 3. No predecessors: cache the event's own slot (if any) directly.
//! 4. Otherwise collect the cached state of each predecessor, in
//!    `prev_events` order, warning about any that are still unknown.
//! 5. Ask the [`StateResolver`] and cache the answer.
//!
//! # Overlapping calls
//!
//! Two `resolve` calls may run at once (a second request issued before the
//! first finished). A per-event gate makes the second caller wait for the
//! first to finish that event and then reuse the cached result instead of
//! issuing a duplicate resolver call. A gate lives only while some call is
//! working on or waiting for its event.

use std::collections::HashMap;
use std::sync::Arc;

use tardis_types::{EventId, StateMap};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cursor::TimelineCursor;
use crate::error::CoreError;
use crate::event_store::EventStore;
use crate::resolver::{StateResolver, base_state};
use crate::state_at_event::StateAtEvent;

/// Outcome of one [`Orchestrator::resolve`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Events whose state was computed by this call.
    pub resolved: usize,
    /// Events whose state was already cached.
    pub cached: usize,
}

/// Fills the state-at-event cache for a timeline prefix.
pub struct Orchestrator<R> {
    store: Arc<EventStore>,
    cache: Arc<RwLock<StateAtEvent>>,
    resolver: R,
    room_version: String,
    in_flight: Mutex<HashMap<EventId, Arc<Mutex<()>>>>,
}

impl<R: StateResolver> Orchestrator<R> {
    /// Create an orchestrator over a loaded scenario's store and cache.
    pub fn new(
        store: Arc<EventStore>,
        cache: Arc<RwLock<StateAtEvent>>,
        resolver: R,
        room_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            resolver,
            room_version: room_version.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve every event from the start of the timeline up to and
    /// including the cursor's current event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingEvent`] if the prefix names an event the
    /// store lacks, or [`CoreError::Resolve`] if the resolver fails. Events
    /// resolved before the failure stay cached; the failed one has no entry.
    pub async fn resolve(&self, cursor: &TimelineCursor) -> Result<ResolveSummary, CoreError> {
        let prefix = cursor.events_up_to_current();
        self.resolve_events(&prefix).await
    }

    /// Resolve the given events in order. `prefix` must be chronological.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::resolve`].
    pub async fn resolve_events(&self, prefix: &[EventId]) -> Result<ResolveSummary, CoreError> {
        let mut summary = ResolveSummary::default();
        for event_id in prefix {
            if self.resolve_event(event_id).await? {
                summary.resolved = summary.resolved.saturating_add(1);
            } else {
                summary.cached = summary.cached.saturating_add(1);
            }
        }
        info!(
            events = prefix.len(),
            resolved = summary.resolved,
            cached = summary.cached,
            "state resolved up to cursor"
        );
        Ok(summary)
    }

    /// Shared handle to the cache this orchestrator fills.
    pub const fn cache(&self) -> &Arc<RwLock<StateAtEvent>> {
        &self.cache
    }

    /// The room version passed to the resolver.
    pub fn room_version(&self) -> &str {
        &self.room_version
    }

    /// The resolver state is obtained from.
    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Returns `true` if the state was computed, `false` if it was cached.
    async fn resolve_event(&self, event_id: &EventId) -> Result<bool, CoreError> {
        if self.cache.read().await.has_state(event_id) {
            return Ok(false);
        }

        let gate = self.gate_for(event_id).await;
        let outcome = self.resolve_gated(event_id, &gate).await;
        self.release_gate(event_id, gate).await;
        outcome
    }

    async fn resolve_gated(&self, event_id: &EventId, gate: &Mutex<()>) -> Result<bool, CoreError> {
        let _in_flight = gate.lock().await;

        // Another call may have finished this event while we waited.
        if self.cache.read().await.has_state(event_id) {
            debug!(event_id = %event_id, "state resolved by a concurrent call");
            return Ok(false);
        }

        let event = self
            .store
            .get(event_id)
            .ok_or_else(|| CoreError::MissingEvent(event_id.clone()))?;

        let state = if event.prev_events.is_empty() {
            base_state(event)
        } else {
            let states = self.predecessor_states(event_id, &event.prev_events).await;
            debug!(
                event_id = %event_id,
                prev_events = ?event.prev_events,
                "performing state resolution for prev_events"
            );
            self.resolver
                .resolve_state(&event.room_id, &self.room_version, states, event)
                .await
                .map_err(|source| CoreError::Resolve {
                    event_id: event_id.clone(),
                    source,
                })?
        };

        self.cache.write().await.set_state(event_id.clone(), state);
        Ok(true)
    }

    /// The cached state after each predecessor, in order. Unknown states
    /// contribute an empty map.
    async fn predecessor_states(&self, event_id: &EventId, prev_events: &[EventId]) -> Vec<StateMap> {
        let cache = self.cache.read().await;
        prev_events
            .iter()
            .map(|prev| {
                let state = cache.get_state(prev);
                if state.is_empty() {
                    warn!(
                        prev_event = %prev,
                        event_id = %event_id,
                        "state at predecessor is not known yet, so the state calculation may be wrong"
                    );
                }
                state
            })
            .collect()
    }

    async fn gate_for(&self, event_id: &EventId) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(event_id.clone()).or_default())
    }

    /// Drop this caller's handle on the gate, and the gate itself once no
    /// caller holds it. Handles are only cloned and dropped under the
    /// `in_flight` lock, so the count is exact.
    async fn release_gate(&self, event_id: &EventId, gate: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        drop(gate);
        let idle = in_flight
            .get(event_id)
            .is_some_and(|gate| Arc::strong_count(gate) == 1);
        if idle {
            in_flight.remove(event_id);
        }
    }
}

impl<R> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("room_version", &self.room_version)
            .field("events", &self.store.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tardis_types::{MatrixEvent, RoomId, StateKey};

    use super::*;
    use crate::error::ResolveError;

    /// One recorded resolver call: the event and the predecessor states.
    type Call = (EventId, Vec<StateMap>);

    /// Resolver double that records calls and answers naively.
    #[derive(Default)]
    struct RecordingResolver {
        calls: StdMutex<Vec<Call>>,
        fail_on: Option<EventId>,
    }

    impl RecordingResolver {
        fn failing_on(id: &str) -> Self {
            Self {
                calls: StdMutex::default(),
                fail_on: Some(EventId::from(id)),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl StateResolver for RecordingResolver {
        async fn resolve_state(
            &self,
            _room_id: &RoomId,
            _room_version: &str,
            states: Vec<StateMap>,
            event: &MatrixEvent,
        ) -> Result<StateMap, ResolveError> {
            self.calls
                .lock()
                .unwrap()
                .push((event.event_id.clone(), states.clone()));
            // Yield so overlapping resolve calls actually interleave.
            tokio::task::yield_now().await;
            if self.fail_on.as_ref() == Some(&event.event_id) {
                return Err(ResolveError::Remote(String::from("boom")));
            }
            let mut merged = StateMap::new();
            for state in &states {
                for (k, v) in state {
                    merged.insert(k.clone(), v.clone());
                }
            }
            if let Some(slot) = event.state_slot() {
                merged.insert(slot, event.event_id.clone());
            }
            Ok(merged)
        }
    }

    fn ev(id: &str, state_key: Option<&str>, prev: &[&str]) -> MatrixEvent {
        let mut json = serde_json::json!({
            "event_id": id,
            "type": if state_key.is_some() { "m.room.member" } else { "m.room.message" },
            "prev_events": prev,
            "room_id": "!room:tardis",
            "depth": 1,
        });
        if let (Some(sk), Some(obj)) = (state_key, json.as_object_mut()) {
            obj.insert(String::from("state_key"), serde_json::json!(sk));
        }
        serde_json::from_value(json).unwrap()
    }

    fn create(id: &str) -> MatrixEvent {
        serde_json::from_value(serde_json::json!({
            "event_id": id, "type": "m.room.create", "state_key": "",
            "room_id": "!room:tardis", "depth": 1,
        }))
        .unwrap()
    }

    fn setup<R: StateResolver>(events: Vec<MatrixEvent>, resolver: R) -> (Orchestrator<R>, TimelineCursor) {
        let ordering = events.iter().map(|e| e.event_id.clone()).collect();
        let store: EventStore = events.into_iter().collect();
        let orchestrator = Orchestrator::new(
            Arc::new(store),
            Arc::new(RwLock::new(StateAtEvent::new())),
            resolver,
            "10",
        );
        (orchestrator, TimelineCursor::new(ordering))
    }

    fn ids(names: &[&str]) -> Vec<EventId> {
        names.iter().copied().map(EventId::from).collect()
    }

    #[tokio::test]
    async fn linear_chain_calls_resolver_once_per_non_root_event() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"]), ev("$C", None, &["$B"])];
        let (orch, cursor) = setup(events, RecordingResolver::default());

        let summary = orch.resolve(&cursor).await.unwrap();
        assert_eq!(summary, ResolveSummary { resolved: 3, cached: 0 });

        let calls = orch.resolver().calls();
        assert_eq!(calls.len(), 2);
        let (first_id, first_states) = calls.first().unwrap();
        assert_eq!(first_id, &EventId::from("$B"));
        let state_a: StateMap = [(StateKey::new("m.room.create", ""), EventId::from("$A"))]
            .into_iter()
            .collect();
        assert_eq!(first_states, &vec![state_a]);

        let (second_id, second_states) = calls.get(1).unwrap();
        assert_eq!(second_id, &EventId::from("$C"));
        let state_b = orch.cache().read().await.get_state(&EventId::from("$B"));
        assert_eq!(second_states, &vec![state_b]);
    }

    #[tokio::test]
    async fn second_resolve_is_a_no_op() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"]), ev("$C", None, &["$B"])];
        let (orch, cursor) = setup(events, RecordingResolver::default());

        orch.resolve(&cursor).await.unwrap();
        let summary = orch.resolve(&cursor).await.unwrap();

        assert_eq!(summary, ResolveSummary { resolved: 0, cached: 3 });
        assert_eq!(orch.resolver().calls().len(), 2);
    }

    #[tokio::test]
    async fn stepping_forward_only_resolves_new_events() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"]), ev("$C", None, &["$B"])];
        let (orch, mut cursor) = setup(events, RecordingResolver::default());
        cursor.go_to(&EventId::from("$B"));

        orch.resolve(&cursor).await.unwrap();
        assert_eq!(orch.resolver().calls().len(), 1);

        cursor.next();
        let summary = orch.resolve(&cursor).await.unwrap();
        assert_eq!(summary, ResolveSummary { resolved: 1, cached: 2 });
        assert_eq!(orch.resolver().calls().len(), 2);
    }

    #[tokio::test]
    async fn merge_passes_predecessor_states_in_recorded_order() {
        let events = vec![
            create("$A"),
            ev("$B", Some("@b:x"), &["$A"]),
            ev("$C", Some("@c:x"), &["$A"]),
            ev("$D", None, &["$B", "$C"]),
        ];
        let (orch, cursor) = setup(events, RecordingResolver::default());
        orch.resolve(&cursor).await.unwrap();

        let calls = orch.resolver().calls();
        let (id, states) = calls.last().unwrap();
        assert_eq!(id, &EventId::from("$D"));

        let cache = orch.cache().read().await;
        assert_eq!(
            states,
            &vec![
                cache.get_state(&EventId::from("$B")),
                cache.get_state(&EventId::from("$C")),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_predecessor_contributes_empty_state() {
        // $B points at an event outside the timeline; resolution proceeds.
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A", "$elsewhere"])];
        let (orch, cursor) = setup(events, RecordingResolver::default());

        orch.resolve(&cursor).await.unwrap();

        let calls = orch.resolver().calls();
        let (_, states) = calls.first().unwrap();
        assert_eq!(states.len(), 2);
        assert!(states.get(1).unwrap().is_empty());
        assert!(orch.cache().read().await.has_state(&EventId::from("$B")));
    }

    #[tokio::test]
    async fn failure_propagates_and_leaves_no_entry() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"]), ev("$C", None, &["$B"])];
        let (orch, cursor) = setup(events, RecordingResolver::failing_on("$B"));

        let err = orch.resolve(&cursor).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Resolve { ref event_id, source: ResolveError::Remote(_) } if event_id == &EventId::from("$B")
        ));

        let cache = orch.cache().read().await;
        assert!(cache.has_state(&EventId::from("$A")));
        assert!(!cache.has_state(&EventId::from("$B")));
        assert!(!cache.has_state(&EventId::from("$C")));
        // $C was never attempted.
        assert_eq!(orch.resolver().calls().len(), 1);
        drop(cache);
        assert!(orch.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn retry_after_failure_redoes_only_the_failed_step() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"])];
        let ordering = ids(&["$A", "$B"]);
        let store: EventStore = events.into_iter().collect();
        let store = Arc::new(store);
        let cache = Arc::new(RwLock::new(StateAtEvent::new()));

        let failing = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            RecordingResolver::failing_on("$B"),
            "10",
        );
        let cursor = TimelineCursor::new(ordering);
        assert!(failing.resolve(&cursor).await.is_err());

        let healthy = Orchestrator::new(store, cache, RecordingResolver::default(), "10");
        let summary = healthy.resolve(&cursor).await.unwrap();
        assert_eq!(summary, ResolveSummary { resolved: 1, cached: 1 });
    }

    #[tokio::test]
    async fn missing_event_aborts() {
        let (orch, _) = setup(vec![create("$A")], RecordingResolver::default());
        let err = orch.resolve_events(&ids(&["$A", "$ghost"])).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingEvent(ref id) if id == &EventId::from("$ghost")));
    }

    #[tokio::test]
    async fn populated_entries_are_never_recomputed() {
        let events = vec![create("$A"), ev("$B", Some("@b:x"), &["$A"]), ev("$C", None, &["$B"])];
        let (orch, cursor) = setup(events, RecordingResolver::default());
        let precomputed: StateMap = [(StateKey::new("m.room.create", ""), EventId::from("$A"))]
            .into_iter()
            .collect();
        orch.cache()
            .write()
            .await
            .set_state(EventId::from("$B"), precomputed.clone());

        orch.resolve(&cursor).await.unwrap();

        let calls = orch.resolver().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls.first().map(|(id, _)| id.clone()), Some(EventId::from("$C")));
        assert_eq!(orch.cache().read().await.get_state(&EventId::from("$B")), precomputed);
    }

    #[tokio::test]
    async fn overlapping_resolves_do_not_duplicate_calls() {
        let events = vec![
            create("$A"),
            ev("$B", Some("@b:x"), &["$A"]),
            ev("$C", None, &["$B"]),
            ev("$D", Some("@d:x"), &["$C"]),
        ];
        let (orch, cursor) = setup(events, RecordingResolver::default());

        let (first, second) = tokio::join!(orch.resolve(&cursor), orch.resolve(&cursor));
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(orch.resolver().calls().len(), 3);
        assert_eq!(first.resolved.saturating_add(second.resolved), 4);
        assert!(orch.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn gates_are_released_after_each_event() {
        let names: Vec<String> = (0..32).map(|i| format!("$E{i}")).collect();
        let mut events = vec![create("$ROOT")];
        let mut prev = String::from("$ROOT");
        for name in &names {
            events.push(ev(name, Some(name.as_str()), &[prev.as_str()]));
            prev.clone_from(name);
        }
        let (orch, cursor) = setup(events, RecordingResolver::default());

        let summary = orch.resolve(&cursor).await.unwrap();
        assert_eq!(summary.resolved, 33);
        assert!(orch.in_flight.lock().await.is_empty());
    }
}
