//! End-to-end resolution tests through [`Session`].
//!
//! A counting resolver stands in for the remote one so the tests can assert
//! exactly which resolver calls were made while stepping through a scenario.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tardis_core::{
    CoreError, NaiveResolver, ResolveError, ResolveSummary, Scenario, Session, StateResolver,
    analyse_auth_dag,
};
use tardis_types::{EventId, MatrixEvent, RoomId, StateKey, StateMap};

/// Delegates to [`NaiveResolver`] after a short sleep, recording each call.
#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
    seen: Mutex<Vec<(EventId, String, usize)>>,
    fail_next: AtomicUsize,
}

impl CountingResolver {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StateResolver for CountingResolver {
    async fn resolve_state(
        &self,
        room_id: &RoomId,
        room_version: &str,
        states: Vec<StateMap>,
        event: &MatrixEvent,
    ) -> Result<StateMap, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((event.event_id.clone(), room_version.to_owned(), states.len()));
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self
            .fail_next
            .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(ResolveError::Transport(String::from("connection reset")));
        }
        NaiveResolver::new()
            .resolve_state(room_id, room_version, states, event)
            .await
    }
}

const NDJSON: &str = r#"
{"event_id":"$CREATE","type":"m.room.create","state_key":"","sender":"@a:x","depth":1,"room_id":"!dag:x","prev_events":[],"content":{"creator":"@a:x"}}
{"event_id":"$ALICE","type":"m.room.member","state_key":"@a:x","sender":"@a:x","depth":2,"room_id":"!dag:x","prev_events":["$CREATE"],"content":{"membership":"join"}}
{"event_id":"$NAME1","type":"m.room.name","state_key":"","sender":"@a:x","depth":3,"room_id":"!dag:x","prev_events":["$ALICE"],"content":{"name":"one"}}
{"event_id":"$NAME2","type":"m.room.name","state_key":"","sender":"@a:x","depth":3,"room_id":"!dag:x","prev_events":["$ALICE"],"content":{"name":"two"}}
{"event_id":"$MERGE","type":"m.room.message","sender":"@a:x","depth":4,"room_id":"!dag:x","prev_events":["$NAME1","$NAME2"],"content":{"body":"merged"}}
"#;

fn id(s: &str) -> EventId {
    EventId::from(s)
}

fn load() -> Session<CountingResolver> {
    let scenario = Scenario::from_ndjson_str(NDJSON).unwrap();
    Session::load(scenario, CountingResolver::default())
}

#[tokio::test]
async fn stepping_through_the_timeline_resolves_each_event_once() {
    let mut session = load();
    session.go_to(&id("$CREATE"));

    session.resolve().await.unwrap();
    assert_eq!(session.resolver().calls(), 0);
    assert_eq!(
        session.state_as_event_ids(&id("$CREATE")).await,
        [id("$CREATE")].into_iter().collect::<BTreeSet<_>>()
    );

    let mut expected_calls = 0;
    while session.current() != Some(&id("$MERGE")) {
        session.next();
        session.resolve().await.unwrap();
        expected_calls += 1;
        assert_eq!(session.resolver().calls(), expected_calls);
    }

    // Stepping back and resolving again needs nothing new.
    session.previous();
    let summary = session.resolve().await.unwrap();
    assert_eq!(summary, ResolveSummary { resolved: 0, cached: 4 });
    assert_eq!(session.resolver().calls(), 4);
}

#[tokio::test]
async fn resolver_sees_room_version_and_predecessor_count() {
    let session = load();
    session.resolve().await.unwrap();

    let seen = session.resolver().seen.lock().unwrap().clone();
    let merge = seen.iter().find(|(event, _, _)| event == &id("$MERGE")).unwrap();
    assert_eq!(merge.1, "10");
    assert_eq!(merge.2, 2);
}

#[tokio::test]
async fn merged_state_is_what_the_resolver_returned() {
    let session = load();
    session.resolve().await.unwrap();

    let state = session.state_at(&id("$MERGE")).await;
    // The naive merge lets the later predecessor win the contested slot.
    assert_eq!(state.get(&StateKey::new("m.room.name", "")), Some(&id("$NAME2")));
    assert_eq!(state.len(), 3);
}

#[tokio::test]
async fn overlapping_requests_share_work() {
    let session = load();

    let (a, b) = tokio::join!(session.resolve(), session.resolve());
    a.unwrap();
    b.unwrap();

    assert_eq!(session.resolver().calls(), 4);
}

#[tokio::test]
async fn failed_step_is_retried_on_next_resolve() {
    let session = load();
    session.resolver().fail_next.store(1, Ordering::SeqCst);

    let err = session.resolve().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Resolve { ref event_id, source: ResolveError::Transport(_) } if event_id == &id("$ALICE")
    ));
    assert!(session.state_at(&id("$ALICE")).await.is_empty());

    let summary = session.resolve().await.unwrap();
    assert_eq!(summary, ResolveSummary { resolved: 4, cached: 1 });
    assert_eq!(session.resolver().calls(), 5);
}

#[tokio::test]
async fn bundled_quickstart_scenario_resolves() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../scenarios/quickstart.json5");
    let scenario = Scenario::from_path(path).unwrap();
    let mut session = Session::load(scenario, CountingResolver::default());

    // on_load_at_start puts the cursor on the second event.
    assert_eq!(session.current(), Some(&id("$JOIN")));
    assert!(session.title().unwrap().starts_with("Step through"));

    assert!(session.go_to(&id("$NAME")));
    let summary = session.resolve().await.unwrap();
    assert_eq!(summary, ResolveSummary { resolved: 6, cached: 1 });
    assert_eq!(session.resolver().calls(), 5);

    // The precalculated state drops the topic set on the fork.
    let at_name = session.state_as_event_ids(&id("$NAME")).await;
    let expected: BTreeSet<EventId> = ["$CREATE", "$JOIN", "$NAME"].into_iter().map(id).collect();
    assert_eq!(at_name, expected);
    assert_eq!(session.annotation_for(&id("$PRESTATE")), Some("precalculated state"));
}

fn bundled(name: &str) -> Scenario {
    let path = format!("{}/../../scenarios/{name}", env!("CARGO_MANIFEST_DIR"));
    Scenario::from_path(path).unwrap()
}

#[tokio::test]
async fn bundled_ordering_scenarios_load_and_step() {
    for name in ["mainline_forks.json5", "power_ordering.json5"] {
        let scenario = bundled(name);
        assert_eq!(scenario.events.len(), 15, "{name}");
        assert_eq!(analyse_auth_dag(&scenario.events), None, "{name}");

        let mut session = Session::load(scenario, NaiveResolver::new());
        assert!(session.go_to(&id("$MERGE3")), "{name}");
        let summary = session.resolve().await.unwrap();
        assert_eq!(summary.resolved, 15, "{name}");
        let expected = session.scenario().annotations.titles.get(&id("$MERGE3")).map(String::as_str);
        assert!(expected.is_some(), "{name}");
        assert_eq!(session.title(), expected, "{name}");
    }
}

#[test]
fn bundled_auth_dag_scenario_is_connected() {
    let scenario = bundled("auth_dag.ndjson");
    let analysis = analyse_auth_dag(&scenario.events).unwrap();
    assert_eq!(analysis.max_prev_auth_events, 2);
    assert!(analysis.connected);
    assert_eq!(analysis.histogram[0].events, 5);
    assert_eq!(analysis.histogram[1].events, 1);
    assert_eq!(analysis.cdf[0].events, 6);
}
