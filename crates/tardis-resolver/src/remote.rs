//! A [`Session`] resolved through a remote shim.

use std::sync::Arc;
use std::time::Duration;

use tardis_core::{EventStore, Scenario, Session};
use tracing::info;

use crate::client::ResolverClient;
use crate::dispatch::InboundHandler;
use crate::error::TransportError;
use crate::transport::ResolverTransport;

/// The resolver a remote session uses: a client sending through the shared
/// transport and serving `get_event` lookups from the session's store.
pub type RemoteResolver = Arc<ResolverClient<Arc<ResolverTransport>, Arc<EventStore>>>;

/// Load `scenario` and connect its resolver to the shim at `url`.
///
/// The returned transport is the session's connection; close it when done.
///
/// # Errors
///
/// Returns [`TransportError::Connect`] if the shim cannot be reached.
pub async fn connect_session(
    scenario: Scenario,
    url: &str,
    timeout: Option<Duration>,
) -> Result<(Session<RemoteResolver>, Arc<ResolverTransport>), TransportError> {
    let transport = Arc::new(ResolverTransport::new());
    let session = Session::load_with(scenario, |store| {
        Arc::new(ResolverClient::new(Arc::clone(&transport), store).with_timeout(timeout))
    });

    let client = Arc::clone(session.resolver());
    let handler: Arc<dyn InboundHandler> = client;
    transport.connect(url, handler).await?;
    info!(url = %url, timeout = ?timeout, "session connected to resolver shim");
    Ok((session, transport))
}
