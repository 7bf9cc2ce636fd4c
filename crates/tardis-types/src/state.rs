//! State maps: which event currently wins each `(type, state_key)` slot.
//!
//! On the wire a [`StateMap`] is a JSON object whose keys are the JSON text
//! of the two-element array `[type, state_key]`, e.g.
//! `{"[\"m.room.create\",\"\"]": "$CREATE"}`. [`StateKey`] encodes that key
//! form and accepts any valid JSON spelling of it when decoding, since the
//! resolver may insert whitespace after the comma.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

use crate::ids::EventId;

/// Identity of a state slot: the event type plus the state key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    /// Event type, e.g. `m.room.member`.
    pub event_type: String,
    /// State key, e.g. a user ID for memberships or `""` for singletons.
    pub state_key: String,
}

impl StateKey {
    /// Build a state key from its two parts.
    pub fn new(event_type: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            state_key: state_key.into(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:?})", self.event_type, self.state_key)
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded =
            serde_json::to_string(&(&self.event_type, &self.state_key)).map_err(S::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let (event_type, state_key): (String, String) = serde_json::from_str(&encoded)
            .map_err(|e| D::Error::custom(format!("invalid state key tuple {encoded:?}: {e}")))?;
        Ok(Self {
            event_type,
            state_key,
        })
    }
}

/// Mapping from state slot to the event ID holding that slot.
///
/// Keys are unique and iteration order is irrelevant to callers; a
/// [`BTreeMap`] keeps debug output and serialisation deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateMap(#[ts(type = "Record<string, string>")] BTreeMap<StateKey, EventId>);

impl StateMap {
    /// An empty state map.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the winner of `key`, returning the previous winner if any.
    pub fn insert(&mut self, key: StateKey, event_id: EventId) -> Option<EventId> {
        self.0.insert(key, event_id)
    }

    /// The event holding `key`, if any.
    pub fn get(&self, key: &StateKey) -> Option<&EventId> {
        self.0.get(key)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(slot, winner)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &EventId)> {
        self.0.iter()
    }

    /// The set of winning event IDs, discarding which slot each one holds.
    pub fn event_ids(&self) -> BTreeSet<EventId> {
        self.0.values().cloned().collect()
    }
}

impl FromIterator<(StateKey, EventId)> for StateMap {
    fn from_iter<I: IntoIterator<Item = (StateKey, EventId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a StateMap {
    type Item = (&'a StateKey, &'a EventId);
    type IntoIter = std::collections::btree_map::Iter<'a, StateKey, EventId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
