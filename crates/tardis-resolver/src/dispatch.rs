//! Inbound frame routing.
//!
//! [`dispatch_frame`] decodes one text frame from the resolver and routes
//! it by type:
//!
//! - `get_event`: the event is looked up through the handler and the frame
//!   is echoed back with the event filled in (or without one, if unknown).
//! - `resolve_state`: the payload is handed to the handler, which pairs it
//!   with the pending request by correlation ID.
//!
//! Malformed frames and unknown types are logged and dropped; they never
//! take the connection down. Keeping this free of any socket makes the
//! protocol testable without a network.

use tardis_types::{CorrelationId, Envelope, EventId, GetEventData, MatrixEvent, MsgType};
use tracing::{debug, warn};

/// Receiver side of the resolver protocol.
pub trait InboundHandler: Send + Sync {
    /// The resolver needs an event it does not have.
    fn on_get_event_request(&self, event_id: &EventId) -> Option<MatrixEvent>;

    /// A `resolve_state` answer arrived. `envelope_error` is the non-empty
    /// envelope-level error, if any; `data` is the undecoded payload.
    fn on_resolve_state_response(
        &self,
        id: &CorrelationId,
        envelope_error: Option<&str>,
        data: serde_json::Value,
    );

    /// The connection to the resolver has gone away.
    fn on_disconnect(&self) {}
}

/// Route one inbound text frame. Returns the frame to send back, if any.
pub fn dispatch_frame<H>(text: &str, handler: &H) -> Option<String>
where
    H: InboundHandler + ?Sized,
{
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "dropping malformed resolver frame");
            return None;
        }
    };
    debug!(kind = ?envelope.kind, correlation_id = %envelope.id, "resolver frame received");

    match envelope.kind {
        MsgType::GetEvent => answer_get_event(envelope, handler),
        MsgType::ResolveState => {
            let error = envelope.error_message().map(str::to_owned);
            handler.on_resolve_state_response(&envelope.id, error.as_deref(), envelope.data);
            None
        }
        MsgType::Unknown => {
            warn!(correlation_id = %envelope.id, "dropping resolver frame of unknown type");
            None
        }
    }
}

fn answer_get_event<H>(envelope: Envelope, handler: &H) -> Option<String>
where
    H: InboundHandler + ?Sized,
{
    let mut data: GetEventData = match serde_json::from_value(envelope.data) {
        Ok(data) => data,
        Err(e) => {
            warn!(correlation_id = %envelope.id, error = %e, "dropping malformed get_event request");
            return None;
        }
    };

    data.event = handler.on_get_event_request(&data.event_id);
    if data.event.is_none() {
        warn!(
            event_id = %data.event_id,
            correlation_id = %envelope.id,
            "resolver asked for an event we do not have"
        );
    }

    let reply = Envelope::new(MsgType::GetEvent, envelope.id, &data)
        .and_then(|reply| serde_json::to_string(&reply));
    match reply {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(event_id = %data.event_id, error = %e, "failed to encode get_event reply");
            None
        }
    }
}
