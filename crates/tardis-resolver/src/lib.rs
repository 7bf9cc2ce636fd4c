//! Client side of the Tardis resolver protocol.
//!
//! The debugger does not implement Matrix state resolution itself. It
//! talks JSON over a WebSocket to a shim wrapping a homeserver's resolver:
//! it sends `resolve_state` requests and answers the shim's `get_event`
//! lookups from the loaded scenario.
//!
//! # Modules
//!
//! - [`client`] -- [`ResolverClient`], which implements
//!   [`StateResolver`](tardis_core::StateResolver) by correlating requests
//!   with responses, and the [`RequestSender`] seam it sends through.
//! - [`dispatch`] -- [`dispatch_frame`] and the [`InboundHandler`] trait.
//! - [`error`] -- [`TransportError`].
//! - [`remote`] -- [`connect_session`], a session wired to a shim.
//! - [`transport`] -- [`ResolverTransport`], the WebSocket connection.
//!
//! # Wiring
//!
//! The transport and the client refer to each other: the client sends
//! through the transport, and the transport routes inbound frames to the
//! client. Build the transport first, hand it to the client, then connect
//! the transport with the client as its handler. [`connect_session`] does
//! exactly that for a loaded scenario.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod remote;
pub mod transport;

pub use client::{RequestSender, ResolverClient};
pub use dispatch::{InboundHandler, dispatch_frame};
pub use error::TransportError;
pub use remote::{RemoteResolver, connect_session};
pub use transport::ResolverTransport;
