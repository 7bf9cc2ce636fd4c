//! Type-safe identifier wrappers.
//!
//! Matrix identifiers are opaque strings assigned by the homeserver (or by
//! the scenario author). Wrapping them prevents an event ID from being
//! passed where a room ID is expected. Correlation identifiers are minted
//! locally, one per resolver request, from random UUIDs.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifier of a room event, e.g. `$CREATE` or a hash-derived ID.
    EventId
}

define_id! {
    /// Identifier of the room the events belong to, e.g. `!abc:example.org`.
    RoomId
}

define_id! {
    /// Token pairing an outbound resolver request with its inbound response.
    ///
    /// Inbound `get_event` requests carry IDs chosen by the remote side, so
    /// this wraps an arbitrary string; [`CorrelationId::generate`] mints
    /// fresh random ones for local requests.
    CorrelationId
}

impl CorrelationId {
    /// Mint a fresh, globally unique correlation ID (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_serializes_as_plain_string() {
        let id = EventId::new("$CREATE");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"$CREATE\""));
    }

    #[test]
    fn generated_correlation_ids_are_distinct() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn display_matches_inner() {
        let room = RoomId::from("!foo:tardis");
        assert_eq!(room.to_string(), "!foo:tardis");
        assert!(RoomId::default().is_empty());
    }
}
