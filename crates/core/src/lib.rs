//! Skulk Core Library
//!
//! Room and session state machine for a hidden-role party game: lobby
//! lifecycle, role assignment, timed elections, task progress, victory
//! evaluation and reconnection by persistent identity.
//!
//! Everything here is synchronous and transport-agnostic. The network
//! layer owns a [`RoomStore`], feeds it inbound events and broadcasts the
//! snapshots it returns.

pub mod election;
pub mod error;
pub mod invariants;
pub mod models;
pub mod random;
mod reconnect;
pub mod registry;
pub mod rules;
pub mod store;
pub mod tasks;
pub mod timer;
pub mod victory;

pub use election::{Candidate, Election, ElectionResult, Tally};
pub use error::{Error, Result};
pub use models::*;
pub use random::{RandomSource, RngSource};
pub use registry::IdentityRegistry;
pub use rules::{GameRules, StalematePolicy};
pub use store::{Departure, Disconnection, Elimination, MeetingCalled, RoomStore, TaskUpdate, VoteConclusion};
pub use tasks::{ProgressReport, TaskCatalog, TaskCategory};
pub use timer::ExpiryHandle;
