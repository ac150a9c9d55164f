//! Core types, collaborator ports and the daily route planner for kerbside.

/// Planner configuration.
pub mod config;
/// In-memory planning store.
pub mod memory;
/// Domain models and identifiers.
pub mod model;
/// Orchestration of a daily planning run.
pub mod planner;
/// Traits describing collaborators and storage.
pub mod ports;
/// Capacity-bounded stop selection.
pub mod selector;
/// Planning state tables shared by the stores.
pub mod state;
/// Visiting order construction.
pub mod tour;

pub use config::*;
pub use memory::*;
pub use model::*;
pub use planner::*;
pub use ports::*;
pub use state::*;
pub use tour::{LocalMatrix, Tour, TourPolicy};
