//! WebSocket channel to the resolver shim.
//!
//! [`ResolverTransport`] owns at most one connection. Once connected, two
//! tasks service it:
//!
//! - **Writer:** drains an unbounded queue of outbound frames into the
//!   socket. Every send (requests from the client, `get_event` replies from
//!   the reader) goes through this queue, so frames are never interleaved.
//! - **Reader:** feeds each inbound text frame to [`dispatch_frame`] and
//!   queues whatever reply it produces. When the socket closes it marks the
//!   connection closed and then tells the handler, which fails the requests
//!   still in flight. A send checks the mark, so no request can be queued
//!   after the in-flight set was drained.
//!
//! # Lifecycle
//!
//! `Disconnected --connect--> Connected --close / remote close--> Disconnected`
//!
//! Sending while disconnected is an error, never a silent drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt as _, StreamExt as _};
use tardis_types::{CorrelationId, Envelope, MsgType, ResolveStateRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::client::RequestSender;
use crate::dispatch::{InboundHandler, dispatch_frame};
use crate::error::TransportError;

enum ConnectionState {
    Disconnected,
    Connected {
        url: String,
        outbound: mpsc::UnboundedSender<Message>,
        open: Arc<AtomicBool>,
        handler: Arc<dyn InboundHandler>,
        reader: JoinHandle<()>,
        writer: JoinHandle<()>,
    },
}

/// The resolver's WebSocket connection.
pub struct ResolverTransport {
    state: Mutex<ConnectionState>,
}

impl Default for ResolverTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverTransport {
    /// A transport with no connection.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Open a connection to `url` and start routing inbound frames to
    /// `handler`. Resolves once the socket is open.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyConnected`] if a live connection
    /// exists, or [`TransportError::Connect`] if the handshake fails.
    pub async fn connect(
        &self,
        url: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<(), TransportError> {
        if self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::Connect {
                url: url.to_owned(),
                message: e.to_string(),
            }
        })?;
        let (mut sink, mut source) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "failed to write frame to resolver");
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                debug!(error = %e, "resolver socket did not close cleanly");
            }
        });

        let replies = outbound.clone();
        let inbound = Arc::clone(&handler);
        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let Some(reply) = dispatch_frame(text.as_str(), inbound.as_ref()) else {
                            continue;
                        };
                        if replies.send(Message::text(reply)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "resolver connection failed");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            info!("resolver connection closed");
            inbound.on_disconnect();
        });

        let mut state = self.lock_state();
        if is_live(&state) {
            // Lost a race with a concurrent connect.
            reader.abort();
            drop(state);
            return Err(TransportError::AlreadyConnected);
        }
        *state = ConnectionState::Connected {
            url: url.to_owned(),
            outbound,
            open,
            handler,
            reader,
            writer,
        };
        drop(state);
        info!(url = %url, "connected to resolver");
        Ok(())
    }

    /// Whether a connection is open and its reader is still running.
    pub fn is_connected(&self) -> bool {
        is_live(&self.lock_state())
    }

    /// Close the connection, if any. Requests still in flight fail.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ConnectionState::Disconnected);
        let ConnectionState::Connected {
            url,
            outbound,
            open,
            handler,
            reader,
            writer,
        } = previous
        else {
            return;
        };

        open.store(false, Ordering::SeqCst);
        reader.abort();
        // The reader holds a queue sender; the writer exits once every
        // sender is gone.
        if let Some(e) = reader.await.err().filter(tokio::task::JoinError::is_panic) {
            warn!(error = %e, "resolver reader task panicked");
        }
        drop(outbound);
        if let Err(e) = writer.await {
            warn!(error = %e, "resolver writer task failed");
        }
        handler.on_disconnect();
        info!(url = %url, "resolver connection closed by client");
    }

    /// Queue a raw frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if there is no live
    /// connection.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        let state = self.lock_state();
        let ConnectionState::Connected { outbound, open, .. } = &*state else {
            return Err(TransportError::NotConnected);
        };
        if !open.load(Ordering::SeqCst) {
            debug!("resolver connection already closed, refusing to send");
            return Err(TransportError::NotConnected);
        }
        if outbound.send(Message::text(text)).is_err() {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_live(state: &ConnectionState) -> bool {
    match state {
        ConnectionState::Connected { open, reader, .. } => {
            open.load(Ordering::SeqCst) && !reader.is_finished()
        }
        ConnectionState::Disconnected => false,
    }
}

impl RequestSender for ResolverTransport {
    fn send_resolve_state(
        &self,
        id: CorrelationId,
        request: &ResolveStateRequest,
    ) -> Result<(), TransportError> {
        let envelope = Envelope::new(MsgType::ResolveState, id, request)?;
        self.send_text(serde_json::to_string(&envelope)?)
    }
}

impl std::fmt::Debug for ResolverTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        let url = match &*state {
            ConnectionState::Connected { url, .. } => Some(url.clone()),
            ConnectionState::Disconnected => None,
        };
        let connected = is_live(&state);
        drop(state);
        f.debug_struct("ResolverTransport")
            .field("url", &url)
            .field("connected", &connected)
            .finish()
    }
}
