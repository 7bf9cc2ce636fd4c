//! Resolver wire protocol.
//!
//! Every frame on the resolver channel is a JSON [`Envelope`]:
//!
//! ```text
//! { "type": "get_event" | "resolve_state", "id": "<correlation>", "data": {...}, "error"?: "..." }
//! ```
//!
//! - `resolve_state` flows client -> resolver as a [`ResolveStateRequest`]
//!   and comes back with the same `id` as a [`ResolveStateResponse`].
//! - `get_event` flows resolver -> client as a [`GetEventData`] with no
//!   event; the client fills in the event and echoes the frame back with
//!   the same `id`.
//!
//! The payload stays a raw [`serde_json::Value`] inside the envelope and is
//! decoded once the type is known.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::event::MatrixEvent;
use crate::ids::{CorrelationId, EventId, RoomId};
use crate::state::StateMap;

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    /// The resolver asks the client for an event by ID.
    GetEvent,
    /// A state resolution request (outbound) or its answer (inbound).
    ResolveState,
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

/// The envelope every frame travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: MsgType,
    /// Correlation ID pairing this frame with its counterpart.
    pub id: CorrelationId,
    /// Transport-level failure reported by the remote side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Type-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Wrap a payload in an envelope.
    pub fn new<T: Serialize>(
        kind: MsgType,
        id: CorrelationId,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind,
            id,
            error: None,
            data: serde_json::to_value(data)?,
        })
    }

    /// The envelope-level error, treating an empty string as no error.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Payload of a `resolve_state` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResolveStateRequest {
    /// Room the event belongs to.
    pub room_id: RoomId,
    /// Room version whose resolution rules apply.
    pub room_version: String,
    /// The state after each predecessor, in the event's `prev_events` order.
    pub state: Vec<StateMap>,
    /// The event being applied on top of the resolved state.
    pub event: MatrixEvent,
}

/// Payload of a `resolve_state` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResolveStateResponse {
    /// The resolved state after the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub result: Option<StateMap>,
    /// The resolver's verdict if the event failed its auth checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

impl ResolveStateResponse {
    /// The auth verdict, treating an empty string as no error.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Payload of a `get_event` exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GetEventData {
    /// The event being asked for.
    pub event_id: EventId,
    /// Filled in by the client when it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub event: Option<MatrixEvent>,
}
