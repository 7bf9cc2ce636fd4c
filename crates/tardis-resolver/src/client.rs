//! Request/response correlation over the resolver channel.
//!
//! [`ResolverClient`] implements [`StateResolver`] on top of a fire-and-
//! forget [`RequestSender`]. Each call gets a fresh random correlation ID
//! and a one-shot completion slot in the pending table; the inbound side
//! ([`InboundHandler::on_resolve_state_response`]) removes the slot and
//! completes it. Responses may arrive in any order.
//!
//! # Outcomes
//!
//! - Envelope-level `error`: the call fails with [`ResolveError::Remote`].
//! - `data.error`: the resolver's auth verdict on the applied event. The
//!   call still succeeds with `data.result`; the verdict is logged.
//! - No `result`: the call succeeds with an empty state map.
//! - Timeout (if configured): the slot is removed and the call fails with
//!   [`ResolveError::Timeout`]. A late response is then unknown and dropped.
//! - Disconnect: every pending call fails with [`ResolveError::Transport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tardis_core::{EventSource, ResolveError, StateResolver};
use tardis_types::{
    CorrelationId, EventId, MatrixEvent, ResolveStateRequest, ResolveStateResponse, RoomId,
    StateMap,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dispatch::InboundHandler;
use crate::error::TransportError;

/// Outbound side of the resolver protocol.
pub trait RequestSender: Send + Sync {
    /// Queue a `resolve_state` request. Returns once the frame is queued,
    /// not when it is answered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the frame cannot be encoded or there is
    /// no connection to send it on.
    fn send_resolve_state(
        &self,
        id: CorrelationId,
        request: &ResolveStateRequest,
    ) -> Result<(), TransportError>;
}

impl<T: RequestSender + ?Sized> RequestSender for Arc<T> {
    fn send_resolve_state(
        &self,
        id: CorrelationId,
        request: &ResolveStateRequest,
    ) -> Result<(), TransportError> {
        (**self).send_resolve_state(id, request)
    }
}

type Completion = oneshot::Sender<Result<StateMap, ResolveError>>;

/// Correlates `resolve_state` requests with their responses.
pub struct ResolverClient<S, E> {
    sender: S,
    events: E,
    pending: Mutex<HashMap<CorrelationId, Completion>>,
    timeout: Option<Duration>,
}

impl<S: RequestSender, E: EventSource> ResolverClient<S, E> {
    /// Create a client that sends through `sender` and answers the
    /// resolver's event lookups from `events`. No timeout is applied.
    pub fn new(sender: S, events: E) -> Self {
        Self {
            sender,
            events,
            pending: Mutex::new(HashMap::new()),
            timeout: None,
        }
    }

    /// Fail calls that get no answer within `timeout`. `None` waits forever.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// The sender requests go out through.
    pub const fn sender(&self) -> &S {
        &self.sender
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<CorrelationId, Completion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(
        &self,
        request: ResolveStateRequest,
    ) -> Result<StateMap, ResolveError> {
        let id = CorrelationId::generate();
        let event_id = request.event.event_id.clone();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);

        if let Err(e) = self.sender.send_resolve_state(id.clone(), &request) {
            self.lock_pending().remove(&id);
            return Err(e.into());
        }
        debug!(
            correlation_id = %id,
            event_id = %event_id,
            states = request.state.len(),
            "resolve_state request sent"
        );

        let received = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    self.lock_pending().remove(&id);
                    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(correlation_id = %id, event_id = %event_id, timeout_ms, "resolve_state timed out");
                    return Err(ResolveError::Timeout {
                        event_id,
                        timeout_ms,
                    });
                }
            },
            None => rx.await,
        };

        match received {
            Ok(outcome) => outcome,
            Err(_closed) => Err(ResolveError::Abandoned),
        }
    }
}

/// Turn a `resolve_state` response into the call's outcome.
fn response_outcome(
    id: &CorrelationId,
    envelope_error: Option<&str>,
    data: serde_json::Value,
) -> Result<StateMap, ResolveError> {
    if let Some(error) = envelope_error {
        return Err(ResolveError::Remote(error.to_owned()));
    }
    let response: ResolveStateResponse = serde_json::from_value(data)
        .map_err(|e| ResolveError::Protocol(format!("malformed resolve_state payload: {e}")))?;
    if let Some(verdict) = response.error_message() {
        warn!(correlation_id = %id, verdict, "resolver rejected the event during auth checks");
    }
    Ok(response.result.unwrap_or_default())
}

impl<S: RequestSender, E: EventSource> StateResolver for ResolverClient<S, E> {
    async fn resolve_state(
        &self,
        room_id: &RoomId,
        room_version: &str,
        states: Vec<StateMap>,
        event: &MatrixEvent,
    ) -> Result<StateMap, ResolveError> {
        self.request(ResolveStateRequest {
            room_id: room_id.clone(),
            room_version: room_version.to_owned(),
            state: states,
            event: event.clone(),
        })
        .await
    }
}

impl<S: RequestSender, E: EventSource> InboundHandler for ResolverClient<S, E> {
    fn on_get_event_request(&self, event_id: &EventId) -> Option<MatrixEvent> {
        self.events.get_event(event_id)
    }

    fn on_resolve_state_response(
        &self,
        id: &CorrelationId,
        envelope_error: Option<&str>,
        data: serde_json::Value,
    ) {
        let Some(completion) = self.lock_pending().remove(id) else {
            warn!(correlation_id = %id, "resolve_state response for unknown request, dropping");
            return;
        };
        if completion.send(response_outcome(id, envelope_error, data)).is_err() {
            debug!(correlation_id = %id, "requester went away before its response arrived");
        }
    }

    fn on_disconnect(&self) {
        let pending: Vec<_> = self.lock_pending().drain().collect();
        if pending.is_empty() {
            return;
        }
        warn!(pending = pending.len(), "resolver disconnected with requests in flight");
        for (id, completion) in pending {
            let failure = Err(ResolveError::Transport(String::from(
                "connection to resolver closed",
            )));
            if completion.send(failure).is_err() {
                debug!(correlation_id = %id, "requester went away before the disconnect was reported");
            }
        }
    }
}

impl<S, E> std::fmt::Debug for ResolverClient<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
