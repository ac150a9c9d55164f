//! Planner tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tour::TourPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Configuration of a [`crate::planner::RoutePlanner`].
pub struct PlannerConfig {
    /// Ordering policy for the selected stops.
    pub tour_policy: TourPolicy,
    /// Limit for every forecast and distance lookup, in milliseconds.
    pub collaborator_timeout_ms: u64,
    /// How many times a plan is redrafted after a concurrent commit claimed its stops.
    pub max_commit_attempts: u32,
}

impl PlannerConfig {
    /// Collaborator timeout as a [`Duration`].
    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            tour_policy: TourPolicy::SortedById,
            collaborator_timeout_ms: 10_000,
            max_commit_attempts: 3,
        }
    }
}
