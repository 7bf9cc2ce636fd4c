//! The room event record.
//!
//! A [`MatrixEvent`] is immutable once it enters the event store. Only the
//! fields the debugger reasons about are modelled; anything else found in
//! the source JSON (hashes, signatures, `unsigned`, ...) is carried in
//! [`MatrixEvent::extra`] so the event can be handed to the resolver exactly
//! as it was loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{EventId, RoomId};
use crate::state::StateKey;

/// Event type of the room creation event.
pub const CREATE_EVENT_TYPE: &str = "m.room.create";

/// A single event in the room DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MatrixEvent {
    /// Unique event identifier. Empty only before scenario validation.
    #[serde(default)]
    pub event_id: EventId,
    /// Event type, e.g. `m.room.member`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Present on state events only. Together with the type it names the
    /// state slot this event competes for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub state_key: Option<String>,
    /// Opaque event content.
    #[serde(default)]
    pub content: serde_json::Value,
    /// User ID of the sender.
    #[serde(default)]
    pub sender: String,
    /// Topological depth as assigned by the creator of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub depth: Option<u64>,
    /// Immediate predecessors in the room DAG, in recorded order.
    #[serde(default)]
    pub prev_events: Vec<EventId>,
    /// Events that authorise this one.
    #[serde(default)]
    pub auth_events: Vec<EventId>,
    /// Predecessors in the auth DAG, for rooms that record one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub prev_auth_events: Option<Vec<EventId>>,
    /// Room this event belongs to. Empty until the scenario loader fills it.
    #[serde(default, skip_serializing_if = "RoomId::is_empty")]
    pub room_id: RoomId,
    /// Origin server timestamp in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub origin_server_ts: Option<u64>,
    /// Fields not modelled above, preserved verbatim.
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MatrixEvent {
    /// Whether this is a state event (it carries a state key).
    pub const fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// The `(type, state_key)` slot this event occupies, if it is a state event.
    pub fn state_slot(&self) -> Option<StateKey> {
        self.state_key
            .as_ref()
            .map(|state_key| StateKey::new(self.event_type.clone(), state_key.clone()))
    }

    /// Whether this is the room's `m.room.create` event.
    pub fn is_create(&self) -> bool {
        self.event_type == CREATE_EVENT_TYPE && self.state_key.as_deref() == Some("")
    }
}
