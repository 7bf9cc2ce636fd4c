//! JSON output of the `validate` and `resolve` subcommands.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tardis_core::{AuthDagAnalysis, ResolveSummary, Scenario, Session, StateResolver, analyse_auth_dag};
use tardis_types::{EventId, RoomId, StateMap};

/// Summary of a validated scenario.
#[derive(Debug, Serialize)]
pub struct ValidateReport {
    /// Room the events belong to.
    pub room_id: RoomId,
    /// Room version used for resolution.
    pub room_version: String,
    /// Number of events.
    pub events: usize,
    /// Number of state events.
    pub state_events: usize,
    /// The room's create event, if present.
    pub create_event: Option<EventId>,
    /// Events with precalculated state.
    pub precalculated: usize,
    /// Scenario title, if any.
    pub title: Option<String>,
    /// Auth DAG statistics, when every event records `prev_auth_events`.
    pub auth_dag: Option<AuthDagAnalysis>,
}

impl ValidateReport {
    /// Summarise `scenario`.
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            room_id: scenario.room_id.clone(),
            room_version: scenario.room_version.clone(),
            events: scenario.events.len(),
            state_events: scenario.events.iter().filter(|e| e.is_state()).count(),
            create_event: scenario
                .events
                .iter()
                .find(|e| e.is_create())
                .map(|e| e.event_id.clone()),
            precalculated: scenario.precalculated_state_after.len(),
            title: scenario.annotations.title.clone(),
            auth_dag: analyse_auth_dag(&scenario.events),
        }
    }
}

/// The state at the cursor after a resolve.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    /// The event the cursor is on.
    pub current: Option<EventId>,
    /// Graph title at this position, if any.
    pub title: Option<String>,
    /// Events whose state this run computed.
    pub resolved: usize,
    /// Events whose state was already known.
    pub cached: usize,
    /// The state after the current event, keyed by `[type, state_key]`.
    pub state: StateMap,
    /// For every state event in the states after the current event's
    /// predecessors, which of those predecessors include it.
    pub state_sets: BTreeMap<EventId, BTreeSet<EventId>>,
}

impl ResolveReport {
    /// Read the report for the session's current position.
    pub async fn collect<R: StateResolver>(session: &Session<R>, summary: ResolveSummary) -> Self {
        let Some(current) = session.current().cloned() else {
            return Self {
                current: None,
                title: session.title().map(str::to_owned),
                resolved: summary.resolved,
                cached: summary.cached,
                state: StateMap::new(),
                state_sets: BTreeMap::new(),
            };
        };

        let prev_events = session
            .store()
            .get(&current)
            .map(|e| e.prev_events.clone())
            .unwrap_or_default();

        Self {
            state: session.state_at(&current).await,
            state_sets: session.inverse_state(&prev_events).await,
            title: session.title().map(str::to_owned),
            current: Some(current),
            resolved: summary.resolved,
            cached: summary.cached,
        }
    }
}
