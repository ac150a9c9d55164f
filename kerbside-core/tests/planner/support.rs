//! Fake collaborators shared by the planner integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use kerbside_core::{
    DayContext, DayOfWeek, DistancePort, ForecastPort, HouseRegistry, LastVisit, MemoryStore,
    PlanRequest, PlannerConfig, PlanningStore, ProviderError, Route, RouteCommit, RouteEdge,
    RouteId, RouteLedger, RoutePlanner, Stop, StopId, StoreError, TourPolicy, Weather,
};
use tokio::sync::Notify;

pub(crate) fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).expect("valid June date")
}

pub(crate) fn request(day: u32, capacity: f64) -> PlanRequest {
    PlanRequest {
        date: date(day),
        context: DayContext {
            day: DayOfWeek::Monday,
            is_holiday: false,
            weather: Weather::Sunny,
        },
        truck_capacity: capacity,
    }
}

/// Stops `1..=count`, each with prior weight equal to `weight`.
pub(crate) fn stops(count: u32, weight: f64) -> Vec<Stop> {
    (1..=count).map(|id| Stop::new(StopId(id), id % 3, weight)).collect()
}

pub(crate) fn ids(raw: &[u32]) -> Vec<StopId> {
    raw.iter().copied().map(StopId).collect()
}

/// Predicts each stop's prior weight and counts calls.
#[derive(Default)]
pub(crate) struct PriorWeight {
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl ForecastPort for PriorWeight {
    async fn forecast(
        &self,
        stops: &[Stop],
        _context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        Ok(stops.iter().map(|stop| (stop.id, stop.prior_weight)).collect())
    }
}

/// Predicts fixed weights per stop.
pub(crate) struct Fixed(pub(crate) HashMap<u32, f64>);

#[async_trait]
impl ForecastPort for Fixed {
    async fn forecast(
        &self,
        stops: &[Stop],
        _context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        stops
            .iter()
            .map(|stop| {
                self.0
                    .get(&stop.id.0)
                    .map(|weight| (stop.id, *weight))
                    .ok_or(ProviderError::UnknownStop(stop.id))
            })
            .collect()
    }
}

/// Always fails.
pub(crate) struct Broken;

#[async_trait]
impl ForecastPort for Broken {
    async fn forecast(
        &self,
        _stops: &[Stop],
        _context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        Err(ProviderError::Unavailable("model not loaded".to_owned()))
    }
}

/// Never answers within a reasonable time.
pub(crate) struct Sleepy;

#[async_trait]
impl ForecastPort for Sleepy {
    async fn forecast(
        &self,
        _stops: &[Stop],
        _context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(BTreeMap::new())
    }
}

/// Predicts prior weights, but only after the test releases it.
#[derive(Default)]
pub(crate) struct Gated {
    /// Signalled once the forecast has started.
    pub(crate) entered: Notify,
    /// Lets the forecast finish.
    pub(crate) release: Notify,
}

#[async_trait]
impl ForecastPort for Gated {
    async fn forecast(
        &self,
        stops: &[Stop],
        _context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(stops.iter().map(|stop| (stop.id, stop.prior_weight)).collect())
    }
}

/// Stops laid out on a line: distance is the identifier difference.
pub(crate) struct Line;

#[async_trait]
impl DistancePort for Line {
    async fn distance(&self, from: StopId, to: StopId) -> Result<f64, ProviderError> {
        Ok(f64::from(from.0.abs_diff(to.0)))
    }
}

/// Distance lookups always fail.
pub(crate) struct NoDistances;

#[async_trait]
impl DistancePort for NoDistances {
    async fn distance(&self, _from: StopId, to: StopId) -> Result<f64, ProviderError> {
        Err(ProviderError::UnknownStop(to))
    }
}

pub(crate) fn planner(
    store: Arc<dyn PlanningStore>,
    forecasts: Arc<dyn ForecastPort>,
    distances: Arc<dyn DistancePort>,
    policy: TourPolicy,
) -> RoutePlanner {
    let config = PlannerConfig {
        tour_policy: policy,
        ..PlannerConfig::default()
    };
    RoutePlanner::new(store, forecasts, distances, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Interference injected right before the first commit.
pub(crate) enum Hook {
    /// Another request stores a route for the same date first.
    RivalRoute,
    /// Another date's commit claims the drafted stops first.
    ClaimStops,
    /// Like `ClaimStops`, but before every commit.
    ClaimEveryTime,
}

/// Memory store that interferes once with the first commit.
pub(crate) struct Interfering {
    pub(crate) inner: MemoryStore,
    hook: Hook,
    fired: AtomicBool,
}

impl Interfering {
    pub(crate) fn new(inner: MemoryStore, hook: Hook) -> Self {
        Self {
            inner,
            hook,
            fired: AtomicBool::new(false),
        }
    }
}

impl Interfering {
    async fn claim(&self, plan: &RouteCommit) -> Result<(), StoreError> {
        let claimed: BTreeSet<StopId> = plan.sequence.iter().copied().collect();
        self.inner.mark_visited(&claimed).await
    }
}

#[async_trait]
impl HouseRegistry for Interfering {
    async fn register(&self, stops: Vec<Stop>) -> Result<(), StoreError> {
        self.inner.register(stops).await
    }

    async fn stops(&self) -> Result<Vec<Stop>, StoreError> {
        self.inner.stops().await
    }

    async fn list_unvisited(&self) -> Result<Vec<Stop>, StoreError> {
        self.inner.list_unvisited().await
    }

    async fn mark_visited(&self, stops: &BTreeSet<StopId>) -> Result<(), StoreError> {
        self.inner.mark_visited(stops).await
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        self.inner.reset_all().await
    }
}

#[async_trait]
impl RouteLedger for Interfering {
    async fn find(&self, date: NaiveDate) -> Result<Option<Route>, StoreError> {
        self.inner.find(date).await
    }

    async fn create(&self, date: NaiveDate, sequence: Vec<StopId>) -> Result<Route, StoreError> {
        self.inner.create(date, sequence).await
    }

    async fn record_edges(&self, route: RouteId, edges: &[RouteEdge]) -> Result<(), StoreError> {
        self.inner.record_edges(route, edges).await
    }

    async fn edges(&self, route: RouteId) -> Result<Vec<RouteEdge>, StoreError> {
        self.inner.edges(route).await
    }

    async fn routes(&self, date: Option<NaiveDate>) -> Result<Vec<Route>, StoreError> {
        self.inner.routes(date).await
    }

    async fn last_visited(&self, stop: StopId) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.last_visited(stop).await
    }

    async fn last_visited_all(&self) -> Result<Vec<LastVisit>, StoreError> {
        self.inner.last_visited_all().await
    }

    async fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError> {
        self.inner.edge_distance(first, second).await
    }
}

#[async_trait]
impl PlanningStore for Interfering {
    async fn commit(&self, plan: RouteCommit) -> Result<Route, StoreError> {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        match self.hook {
            Hook::RivalRoute if first => {
                self.inner.create(plan.date, ids(&[99])).await?;
            }
            Hook::ClaimStops if first => self.claim(&plan).await?,
            Hook::ClaimEveryTime => self.claim(&plan).await?,
            Hook::RivalRoute | Hook::ClaimStops => {}
        }
        self.inner.commit(plan).await
    }
}
