//! Daily route planning: selection, tour construction and idempotent persistence.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::model::{
    DayContext, ForecastReading, LastVisit, PlanRequest, Route, RouteEdge, RouteState, Stop,
    StopId, UnknownVariant,
};
use crate::ports::{DistancePort, ForecastPort, PlanningStore, ProviderError, RouteCommit, StoreError};
use crate::selector::{self, Selection};
use crate::tour::{self, LocalMatrix, Tour};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Step of a planning run, reported with storage failures.
pub enum Stage {
    /// Looking for an already stored route.
    CacheLookup,
    /// Reading the registry.
    ListStops,
    /// Writing the route and visit bookkeeping.
    Commit,
    /// Re-reading the route of a concurrent winner.
    ConflictRecovery,
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CacheLookup => "cache lookup",
            Stage::ListStops => "stop listing",
            Stage::Commit => "commit",
            Stage::ConflictRecovery => "conflict recovery",
        };
        write!(formatter, "{name}")
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors surfaced by [`RoutePlanner::plan_route`].
pub enum PlanError {
    /// The request was rejected before any state was touched.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// The registry holds no stops at all.
    #[error("No stops registered to plan {date}")]
    EmptyFleet {
        /// Requested date.
        date: NaiveDate,
    },
    /// The forecast collaborator failed or timed out.
    #[error("Forecast unavailable for {date}: {source}")]
    ForecastUnavailable {
        /// Requested date.
        date: NaiveDate,
        /// Collaborator failure.
        #[source]
        source: ProviderError,
    },
    /// The distance collaborator failed or timed out while building the tour.
    #[error("Distance lookup failed for {date}: {source}")]
    DistanceUnavailable {
        /// Requested date.
        date: NaiveDate,
        /// Collaborator failure.
        #[source]
        source: ProviderError,
    },
    /// Registry or ledger failure.
    #[error("Storage failed for {date} during {stage}: {source}")]
    Store {
        /// Requested date.
        date: NaiveDate,
        /// Step that failed.
        stage: Stage,
        /// Storage failure.
        #[source]
        source: StoreError,
    },
    /// Concurrent planners for other dates kept claiming the drafted stops.
    #[error("Route for {date} could not be committed after {attempts} attempts")]
    Contention {
        /// Requested date.
        date: NaiveDate,
        /// Number of drafts discarded.
        attempts: u32,
    },
}

impl From<UnknownVariant> for PlanError {
    fn from(err: UnknownVariant) -> Self {
        PlanError::Validation(err.to_string())
    }
}

impl PlanRequest {
    /// Build a request from raw day-of-week and weather names.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Validation`] for unrecognized names or an invalid capacity.
    pub fn parse(
        date: NaiveDate,
        day: &str,
        is_holiday: bool,
        weather: &str,
        truck_capacity: f64,
    ) -> Result<Self, PlanError> {
        let request = Self {
            date,
            context: DayContext {
                day: day.parse()?,
                is_holiday,
                weather: weather.parse()?,
            },
            truck_capacity,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the capacity is a non-negative number.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Validation`] for a negative or non-finite capacity.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.truck_capacity.is_finite() || self.truck_capacity < 0.0 {
            return Err(PlanError::Validation(format!(
                "truck capacity must be a non-negative number, got {}",
                self.truck_capacity
            )));
        }
        Ok(())
    }
}

/// Work produced by steps 2 to 5, not yet persisted.
struct Draft {
    selection: Selection,
    tour: Tour,
    wraparound: bool,
}

enum CommitOutcome {
    Stored(Route),
    Stale(StopId),
}

/// Orchestrates registry, forecast, selection, tour and ledger into one idempotent operation.
pub struct RoutePlanner {
    store: Arc<dyn PlanningStore>,
    forecasts: Arc<dyn ForecastPort>,
    distances: Arc<dyn DistancePort>,
    config: PlannerConfig,
    date_locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl RoutePlanner {
    /// Create a planner over explicit collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn PlanningStore>,
        forecasts: Arc<dyn ForecastPort>,
        distances: Arc<dyn DistancePort>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            store,
            forecasts,
            distances,
            config,
            date_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the route for `request.date`, computing and storing it on first request.
    ///
    /// A date that already has a route returns it verbatim whatever the other
    /// parameters are. Requests for the same date are serialized; a creation
    /// race lost at the storage level is resolved by returning the winner.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] describing the failed stage. Nothing is written
    /// unless the route commit succeeds.
    pub async fn plan_route(&self, request: &PlanRequest) -> Result<Route, PlanError> {
        request.validate()?;
        let date = request.date;

        if let Some(route) = self.cached(date).await? {
            debug!(%date, route = %route.id, "route already planned");
            return Ok(route);
        }

        let lock = self.date_lock(date).await;
        let _guard = lock.lock().await;

        let attempts = self.config.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(route) = self.cached(date).await? {
                debug!(%date, route = %route.id, "route planned by concurrent request");
                return Ok(route);
            }

            let draft = self.draft(request).await?;
            match self.commit(date, &draft).await? {
                CommitOutcome::Stored(route) => {
                    info!(
                        %date,
                        route = %route.id,
                        stops = route.sequence.len(),
                        weight = draft.selection.total_weight,
                        wraparound = draft.wraparound,
                        "route planned"
                    );
                    self.record_edges(&route, draft.tour.matrix.as_ref()).await;
                    return Ok(route);
                }
                CommitOutcome::Stale(stop) => {
                    warn!(%date, %stop, attempt, "drafted stop was claimed concurrently, redrafting");
                }
            }
        }

        Err(PlanError::Contention { date, attempts })
    }

    /// Planning state of a date.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn route_state(&self, date: NaiveDate) -> Result<RouteState, StoreError> {
        if self.store.find(date).await?.is_some() {
            return Ok(RouteState::Cached);
        }
        let locks = self.date_locks.lock().await;
        let busy = locks
            .get(&date)
            .is_some_and(|lock| lock.try_lock().is_err());
        Ok(if busy {
            RouteState::Computing
        } else {
            RouteState::Absent
        })
    }

    /// Stored route for a date.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn route_for(&self, date: NaiveDate) -> Result<Option<Route>, StoreError> {
        self.store.find(date).await
    }

    /// Stored routes ordered by date, optionally restricted to one date.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn history(&self, date: Option<NaiveDate>) -> Result<Vec<Route>, StoreError> {
        self.store.routes(date).await
    }

    /// Latest visit date of one stop.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn last_visited(&self, stop: StopId) -> Result<Option<NaiveDate>, StoreError> {
        self.store.last_visited(stop).await
    }

    /// Latest visit date of every visited stop.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn last_visited_all(&self) -> Result<Vec<LastVisit>, StoreError> {
        self.store.last_visited_all().await
    }

    /// Distance between two stops that were consecutive in a stored route.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pair never appeared consecutively.
    pub async fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError> {
        self.store.edge_distance(first, second).await
    }

    /// Whether the stop is part of the route stored for `date`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the ledger cannot be read.
    pub async fn is_scheduled(&self, date: NaiveDate, stop: StopId) -> Result<bool, StoreError> {
        Ok(self
            .store
            .find(date)
            .await?
            .is_some_and(|route| route.contains(stop)))
    }

    /// Release the planner and close its store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot flush.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        self.store.close().await
    }

    async fn cached(&self, date: NaiveDate) -> Result<Option<Route>, PlanError> {
        self.store.find(date).await.map_err(|source| PlanError::Store {
            date,
            stage: Stage::CacheLookup,
            source,
        })
    }

    async fn date_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.date_locks.lock().await;
        // Drop locks nobody else holds a handle to.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(date).or_default())
    }

    async fn draft(&self, request: &PlanRequest) -> Result<Draft, PlanError> {
        let date = request.date;
        let (candidates, wraparound) = self.candidates(date).await?;

        let forecasts = self.forecast(request, &candidates).await?;
        let selection = selector::select(&forecasts, request.truck_capacity);
        debug!(
            %date,
            candidates = candidates.len(),
            selected = selection.stops.len(),
            weight = selection.total_weight,
            capacity = request.truck_capacity,
            "stops selected"
        );

        let selected: BTreeSet<StopId> = selection.stops.iter().copied().collect();
        let tour = tour::build_tour(
            &selected,
            self.distances.as_ref(),
            self.config.tour_policy,
            self.config.collaborator_timeout(),
        )
        .await
        .map_err(|source| PlanError::DistanceUnavailable { date, source })?;

        Ok(Draft {
            selection,
            tour,
            wraparound,
        })
    }

    /// Unvisited stops, or every stop when the cycle is complete.
    async fn candidates(&self, date: NaiveDate) -> Result<(Vec<Stop>, bool), PlanError> {
        let listing = |source| PlanError::Store {
            date,
            stage: Stage::ListStops,
            source,
        };

        let unvisited = self.store.list_unvisited().await.map_err(listing)?;
        if !unvisited.is_empty() {
            return Ok((unvisited, false));
        }

        // The reset itself is applied by the commit.
        let everything = self.store.stops().await.map_err(listing)?;
        if everything.is_empty() {
            return Err(PlanError::EmptyFleet { date });
        }
        info!(%date, stops = everything.len(), "all stops visited, starting a new cycle");
        Ok((everything, true))
    }

    async fn forecast(
        &self,
        request: &PlanRequest,
        stops: &[Stop],
    ) -> Result<Vec<ForecastReading>, PlanError> {
        let date = request.date;
        let context = request.context;
        let limit = self.config.collaborator_timeout();
        let unavailable = |source| PlanError::ForecastUnavailable { date, source };

        let predicted = timeout(limit, self.forecasts.forecast(stops, &context))
            .await
            .map_err(|_elapsed| unavailable(ProviderError::Timeout(limit)))?
            .map_err(unavailable)?;

        stops
            .iter()
            .map(|stop| {
                let weight = predicted.get(&stop.id).copied().ok_or_else(|| {
                    unavailable(ProviderError::InvalidResponse(format!(
                        "no prediction for stop {}",
                        stop.id
                    )))
                })?;
                if !weight.is_finite() || weight < 0.0 {
                    return Err(unavailable(ProviderError::InvalidResponse(format!(
                        "prediction {weight} for stop {} is not a non-negative weight",
                        stop.id
                    ))));
                }
                Ok(ForecastReading {
                    stop: stop.id,
                    context,
                    predicted_weight: weight,
                })
            })
            .collect()
    }

    async fn commit(&self, date: NaiveDate, draft: &Draft) -> Result<CommitOutcome, PlanError> {
        let plan = RouteCommit {
            date,
            sequence: draft.tour.order.clone(),
            wraparound: draft.wraparound,
        };

        match self.store.commit(plan).await {
            Ok(route) => Ok(CommitOutcome::Stored(route)),
            Err(StoreError::Conflict(_)) => {
                info!(%date, "lost creation race, using the stored route");
                let recovery = |source| PlanError::Store {
                    date,
                    stage: Stage::ConflictRecovery,
                    source,
                };
                let route = self
                    .store
                    .find(date)
                    .await
                    .map_err(recovery)?
                    .ok_or_else(|| {
                        recovery(StoreError::NotFound(format!(
                            "route for {date} reported as conflicting"
                        )))
                    })?;
                Ok(CommitOutcome::Stored(route))
            }
            Err(StoreError::StaleSelection(stop)) => Ok(CommitOutcome::Stale(stop)),
            Err(source) => Err(PlanError::Store {
                date,
                stage: Stage::Commit,
                source,
            }),
        }
    }

    /// Best effort: a missing distance leaves the route without edges.
    async fn record_edges(&self, route: &Route, matrix: Option<&LocalMatrix>) {
        let limit = self.config.collaborator_timeout();
        let mut edges = Vec::with_capacity(route.sequence.len().saturating_sub(1));

        for (from, to) in route.legs() {
            let known = matrix.and_then(|table| table.get(from, to));
            let distance = match known {
                Some(distance) => distance,
                None => match timeout(limit, self.distances.distance(from, to)).await {
                    Ok(Ok(distance)) if distance.is_finite() && distance >= 0.0 => distance,
                    Ok(Ok(distance)) => {
                        warn!(date = %route.date, %from, %to, distance, "invalid distance, edges not recorded");
                        return;
                    }
                    Ok(Err(err)) => {
                        warn!(date = %route.date, %from, %to, error = %err, "distance lookup failed, edges not recorded");
                        return;
                    }
                    Err(_elapsed) => {
                        warn!(date = %route.date, %from, %to, ?limit, "distance lookup timed out, edges not recorded");
                        return;
                    }
                },
            };
            edges.push(RouteEdge {
                route: route.id,
                from,
                to,
                distance,
            });
        }

        if edges.is_empty() {
            return;
        }
        if let Err(err) = self.store.record_edges(route.id, &edges).await {
            warn!(date = %route.date, route = %route.id, error = %err, "failed to store route edges");
        }
    }
}
