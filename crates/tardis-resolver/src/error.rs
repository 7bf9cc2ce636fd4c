//! Error types for the resolver transport.

use tardis_core::ResolveError;

/// Failures of the WebSocket channel to the resolver.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A frame was sent while no connection is open.
    #[error("resolver transport is not connected")]
    NotConnected,

    /// `connect` was called on a transport that already has a connection.
    #[error("resolver transport is already connected")]
    AlreadyConnected,

    /// Opening the WebSocket failed.
    #[error("failed to connect to resolver at {url}: {message}")]
    Connect {
        /// The address that was dialled.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A frame could not be encoded.
    #[error("failed to encode resolver frame: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TransportError> for ResolveError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}
