//! Shared type definitions for the Tardis room DAG debugger.
//!
//! This crate is the single source of truth for the data model shared by
//! the resolution engine, the resolver transport, and the renderer. Types
//! flow downstream to `TypeScript` via `ts-rs` for the graph renderer.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for event, room, and correlation IDs
//! - [`event`] -- The [`MatrixEvent`] record
//! - [`state`] -- [`StateKey`] and [`StateMap`]
//! - [`wire`] -- Resolver protocol envelope and payloads

pub mod event;
pub mod ids;
pub mod state;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use event::{CREATE_EVENT_TYPE, MatrixEvent};
pub use ids::{CorrelationId, EventId, RoomId};
pub use state::{StateKey, StateMap};
pub use wire::{Envelope, GetEventData, MsgType, ResolveStateRequest, ResolveStateResponse};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings to the `bindings/` directory relative
        // to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::RoomId::export_all();
        let _ = crate::ids::CorrelationId::export_all();

        let _ = crate::event::MatrixEvent::export_all();
        let _ = crate::state::StateMap::export_all();

        let _ = crate::wire::ResolveStateRequest::export_all();
        let _ = crate::wire::ResolveStateResponse::export_all();
        let _ = crate::wire::GetEventData::export_all();
    }
}
