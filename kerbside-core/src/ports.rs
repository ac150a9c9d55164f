//! Traits describing the planner's collaborators and storage, plus their error types.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Error as IoError;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Error as ReqwestError;

use crate::model::{DayContext, LastVisit, Route, RouteEdge, RouteId, Stop, StopId};

#[derive(thiserror::Error, Debug)]
/// Errors raised by external collaborators (forecast and distance providers).
pub enum ProviderError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// The provider has no data for the stop.
    #[error("Unknown stop: {0}")]
    UnknownStop(StopId),
    /// The call did not complete within the imposed limit.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// The provider answered with data that violates its contract.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The provider could not be loaded or reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug)]
/// Errors raised by the house registry and the route ledger.
pub enum StoreError {
    /// The stop identifier is not registered.
    #[error("Unknown stop: {0}")]
    UnknownStop(StopId),
    /// A route for the date already exists.
    #[error("Route for {0} already exists")]
    Conflict(NaiveDate),
    /// A stop chosen by the planner was claimed by a concurrent commit.
    #[error("Stop {0} is no longer available for selection")]
    StaleSelection(StopId),
    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Durable storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    /// Storage backend reported an inconsistency.
    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
/// Symmetric distance lookup between two stops.
pub trait DistancePort: Send + Sync {
    /// Distance between `from` and `to`; equal to the distance between `to` and `from`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownStop`] when either stop is not covered.
    async fn distance(&self, from: StopId, to: StopId) -> Result<f64, ProviderError>;
}

#[async_trait]
/// Black-box waste weight forecast for a set of stops on one day.
pub trait ForecastPort: Send + Sync {
    /// Predicted weight per stop. Repeated calls with identical input yield identical output.
    ///
    /// Stops are passed whole because their neighborhood and prior weight are model features.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the prediction cannot be produced.
    async fn forecast(
        &self,
        stops: &[Stop],
        context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError>;
}

#[async_trait]
/// Registry of stops and their visited flags.
pub trait HouseRegistry: Send + Sync {
    /// Insert stops or update their features. Existing visited flags are kept.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the registry cannot be written.
    async fn register(&self, stops: Vec<Stop>) -> Result<(), StoreError>;

    /// All registered stops ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the registry cannot be read.
    async fn stops(&self) -> Result<Vec<Stop>, StoreError>;

    /// Stops not yet visited in the current cycle, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the registry cannot be read.
    async fn list_unvisited(&self) -> Result<Vec<Stop>, StoreError>;

    /// Flag the stops as visited. Already visited stops are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownStop`] without changing anything if any identifier is unknown.
    async fn mark_visited(&self, stops: &BTreeSet<StopId>) -> Result<(), StoreError>;

    /// Clear every visited flag, starting a new service cycle.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the registry cannot be written.
    async fn reset_all(&self) -> Result<(), StoreError>;
}

#[async_trait]
/// Per-date route persistence and visit bookkeeping.
pub trait RouteLedger: Send + Sync {
    /// Route stored for the date, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    async fn find(&self, date: NaiveDate) -> Result<Option<Route>, StoreError>;

    /// Store a new route for the date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a route for the date already exists.
    async fn create(&self, date: NaiveDate, sequence: Vec<StopId>) -> Result<Route, StoreError>;

    /// Store the realized distances of a route's consecutive stops.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the route does not exist.
    async fn record_edges(&self, route: RouteId, edges: &[RouteEdge]) -> Result<(), StoreError>;

    /// Edges recorded for a route in visiting order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    async fn edges(&self, route: RouteId) -> Result<Vec<RouteEdge>, StoreError>;

    /// Stored routes ordered by date, optionally restricted to one date.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    async fn routes(&self, date: Option<NaiveDate>) -> Result<Vec<Route>, StoreError>;

    /// Latest date the stop appeared in a route.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    async fn last_visited(&self, stop: StopId) -> Result<Option<NaiveDate>, StoreError>;

    /// Latest visit date of every stop that has been visited at least once.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    async fn last_visited_all(&self) -> Result<Vec<LastVisit>, StoreError>;

    /// Distance between two stops in the most recent route where they were consecutive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pair never appeared as consecutive stops.
    async fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Everything a successful planning run writes in one atomic unit.
pub struct RouteCommit {
    /// Route date.
    pub date: NaiveDate,
    /// Visiting order over the selected stops.
    pub sequence: Vec<StopId>,
    /// Reset every visited flag before marking the selection.
    pub wraparound: bool,
}

#[async_trait]
/// Combined registry and ledger able to persist a planning run atomically.
pub trait PlanningStore: HouseRegistry + RouteLedger {
    /// Create the route, mark its stops visited and append their visit records, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the date already has a route and
    /// [`StoreError::StaleSelection`] when a selected stop was visited meanwhile.
    async fn commit(&self, plan: RouteCommit) -> Result<Route, StoreError>;

    /// Flush and release the store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when pending state cannot be written.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
