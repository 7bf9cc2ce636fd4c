//! Shape statistics for rooms that record an auth DAG.
//!
//! Some scenarios carry `prev_auth_events` on every event: the event's
//! predecessors in the auth DAG rather than the room DAG. [`analyse_auth_dag`]
//! summarises how wide that DAG fans in and whether every referenced
//! predecessor is present.
//!
//! Fan-in counts are grouped into buckets `1..=10`, `15`, `20`, `50`, and
//! unbounded. A count lands in the smallest bucket that holds it. The
//! histogram counts each event once, in its own bucket. The cumulative
//! counts tag every bucket up to and including the event's own, so bucket
//! `n` says how many events have at least `n` (snapped) predecessors.
//! Events with no `prev_auth_events` (the create event) are left out of
//! both.

use std::collections::HashSet;

use serde::Serialize;
use tardis_types::{EventId, MatrixEvent};
use tracing::debug;

/// Upper bounds of the bounded buckets. One more, unbounded, bucket follows.
const BUCKET_BOUNDS: [usize; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 15, 20, 50];

/// Number of buckets, including the unbounded one.
const BUCKETS: usize = BUCKET_BOUNDS.len() + 1;

/// Events counted in one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    /// Largest count the bucket holds; `None` for the unbounded bucket.
    pub upper: Option<usize>,
    /// Events in the bucket.
    pub events: usize,
}

/// Summary of a scenario's auth DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthDagAnalysis {
    /// Largest `prev_auth_events` list on any event.
    pub max_prev_auth_events: usize,
    /// Events per bucket.
    pub histogram: Vec<BucketCount>,
    /// Events per bucket, cumulative towards the smaller buckets.
    pub cdf: Vec<BucketCount>,
    /// Whether every `prev_auth_events` entry names an event in the
    /// scenario.
    pub connected: bool,
    /// `prev_auth_events` entries that name no event in the scenario.
    pub missing: Vec<EventId>,
}

/// Index of the bucket a fan-in of `count` falls into.
fn bucket_index(count: usize) -> usize {
    BUCKET_BOUNDS
        .iter()
        .position(|&bound| count <= bound)
        .unwrap_or(BUCKET_BOUNDS.len())
}

fn bucket_counts(counts: &[usize; BUCKETS]) -> Vec<BucketCount> {
    let uppers = BUCKET_BOUNDS.iter().copied().map(Some).chain([None]);
    uppers
        .zip(counts.iter().copied())
        .map(|(upper, events)| BucketCount { upper, events })
        .collect()
}

/// Analyse the auth DAG formed by `events`.
///
/// Returns `None` if any event lacks `prev_auth_events`, since the auth
/// DAG is then not recorded for this room.
pub fn analyse_auth_dag(events: &[MatrixEvent]) -> Option<AuthDagAnalysis> {
    let mut histogram = [0_usize; BUCKETS];
    let mut cdf = [0_usize; BUCKETS];
    let mut max_prev_auth_events = 0;
    let mut known: HashSet<&EventId> = HashSet::with_capacity(events.len());
    let mut referenced: HashSet<&EventId> = HashSet::new();

    for event in events {
        known.insert(&event.event_id);
        let Some(prev_auth_events) = event.prev_auth_events.as_ref() else {
            debug!(event_id = %event.event_id, "event has no prev_auth_events, skipping auth DAG analysis");
            return None;
        };
        max_prev_auth_events = max_prev_auth_events.max(prev_auth_events.len());
        if prev_auth_events.is_empty() {
            continue;
        }
        referenced.extend(prev_auth_events.iter());

        let bucket = bucket_index(prev_auth_events.len());
        if let Some(slot) = histogram.get_mut(bucket) {
            *slot = slot.saturating_add(1);
        }
        for slot in cdf.iter_mut().take(bucket.saturating_add(1)) {
            *slot = slot.saturating_add(1);
        }
    }

    let mut missing: Vec<EventId> = referenced
        .into_iter()
        .filter(|id| !known.contains(id))
        .cloned()
        .collect();
    missing.sort();

    Some(AuthDagAnalysis {
        max_prev_auth_events,
        histogram: bucket_counts(&histogram),
        cdf: bucket_counts(&cdf),
        connected: missing.is_empty(),
        missing,
    })
}
