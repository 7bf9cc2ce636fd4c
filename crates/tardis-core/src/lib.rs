//! Event store, state cache, timeline cursor, and resolution orchestration
//! for the Tardis room DAG debugger.
//!
//! A scenario is a list of room events in processing order. The debugger
//! steps a cursor through that list and, on request, computes the room
//! state after every event up to the cursor by delegating each merge to a
//! [`StateResolver`]. Results are memoised per event so stepping forward
//! only ever resolves the new events.
//!
//! # Modules
//!
//! - [`auth_dag`] -- [`analyse_auth_dag`], fan-in statistics for the auth DAG.
//! - [`cursor`] -- [`TimelineCursor`], the clamped position in the timeline.
//! - [`error`] -- [`ResolveError`] and [`CoreError`].
//! - [`event_store`] -- [`EventStore`] and the [`EventSource`] lookup trait.
//! - [`orchestrator`] -- [`Orchestrator`], which fills the cache for a prefix.
//! - [`resolver`] -- [`StateResolver`] trait and [`NaiveResolver`].
//! - [`scenario`] -- Scenario file parsing and validation.
//! - [`session`] -- [`Session`], one loaded scenario.
//! - [`state_at_event`] -- [`StateAtEvent`], the per-event state cache.

pub mod auth_dag;
pub mod cursor;
pub mod error;
pub mod event_store;
pub mod orchestrator;
pub mod resolver;
pub mod scenario;
pub mod session;
pub mod state_at_event;

pub use auth_dag::{AuthDagAnalysis, BucketCount, analyse_auth_dag};
pub use cursor::TimelineCursor;
pub use error::{CoreError, ResolveError};
pub use event_store::{EventSource, EventStore};
pub use orchestrator::{Orchestrator, ResolveSummary};
pub use resolver::{NaiveResolver, StateResolver, base_state};
pub use scenario::{Annotations, DEFAULT_ROOM_VERSION, Scenario, ScenarioError, ScenarioFile};
pub use session::Session;
pub use state_at_event::StateAtEvent;
