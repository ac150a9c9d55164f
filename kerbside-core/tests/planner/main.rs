//! End-to-end planning runs against the in-memory store.

mod support;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use kerbside_core::{
    DayContext, DayOfWeek, HouseRegistry, MemoryStore, PlanError, PlanRequest,
    ProviderError, RouteLedger, RouteState, Stop, StopId, TourPolicy, Weather,
};

use support::{
    Broken, Fixed, Gated, Hook, Interfering, Line, NoDistances, PriorWeight, Sleepy, date, ids,
    planner, request, stops,
};

fn unvisited_ids(stops: &[Stop]) -> Vec<StopId> {
    stops.iter().map(|stop| stop.id).collect()
}

#[tokio::test]
async fn plans_selects_and_persists_a_route() {
    let store = Arc::new(MemoryStore::with_stops(stops(6, 2.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let route = planner.plan_route(&request(3, 6.0)).await.expect("route planned");

    // Equal weights: ties resolve by identifier, three stops fill the truck.
    assert_eq!(route.sequence, ids(&[1, 2, 3]));
    assert_eq!(route.date, date(3));
    assert_eq!(unvisited_ids(&store.list_unvisited().await.expect("read")), ids(&[4, 5, 6]));
    assert_eq!(store.last_visited(StopId(2)).await.expect("read"), Some(date(3)));

    let edges = store.edges(route.id).await.expect("read");
    assert_eq!(edges.len(), route.sequence.len() - 1);
    assert!(edges.iter().all(|edge| (edge.distance - 1.0).abs() < f64::EPSILON));
}

#[tokio::test]
async fn same_date_returns_stored_route_whatever_the_parameters() {
    let store = Arc::new(MemoryStore::with_stops(stops(8, 1.0)));
    let forecasts = Arc::new(PriorWeight::default());
    let planner = planner(store.clone(), forecasts.clone(), Arc::new(Line), TourPolicy::SortedById);

    let first = planner.plan_route(&request(4, 3.0)).await.expect("first");
    let other = PlanRequest {
        context: DayContext {
            day: DayOfWeek::Saturday,
            is_holiday: true,
            weather: Weather::Rainy,
        },
        truck_capacity: 100.0,
        ..request(4, 3.0)
    };
    let second = planner.plan_route(&other).await.expect("second");

    assert_eq!(first, second);
    assert_eq!(forecasts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.list_unvisited().await.expect("read").len(), 5);
    assert_eq!(planner.route_state(date(4)).await.expect("state"), RouteState::Cached);
}

#[tokio::test]
async fn greedy_selection_skips_overflow_and_stops_at_capacity() {
    let weights = HashMap::from([(1, 6.0), (2, 5.0), (3, 4.0)]);
    let store = Arc::new(MemoryStore::with_stops(stops(3, 0.0)));
    let planner = planner(store, Arc::new(Fixed(weights)), Arc::new(Line), TourPolicy::SortedById);

    let route = planner.plan_route(&request(5, 10.0)).await.expect("route planned");

    assert_eq!(route.sequence, ids(&[1, 3]));
}

#[tokio::test]
async fn nearest_neighbor_policy_orders_by_distance() {
    let weights = HashMap::from([(2, 1.0), (5, 1.0), (9, 1.0), (10, 1.0)]);
    let mut registered = stops(10, 0.0);
    registered.retain(|stop| weights.contains_key(&stop.id.0));
    let store = Arc::new(MemoryStore::with_stops(registered));
    let planner = planner(store.clone(), Arc::new(Fixed(weights)), Arc::new(Line), TourPolicy::NearestNeighbor);

    let route = planner.plan_route(&request(6, 10.0)).await.expect("route planned");

    assert_eq!(route.sequence, ids(&[2, 5, 9, 10]));
    assert_eq!(planner.edge_distance(StopId(9), StopId(5)).await.expect("edge"), 4.0);
    assert_eq!(planner.edge_distance(StopId(5), StopId(9)).await.expect("edge"), 4.0);
    assert!(planner.edge_distance(StopId(2), StopId(10)).await.is_err());
}

#[tokio::test]
async fn exhausted_cycle_wraps_around_once() {
    let store = Arc::new(MemoryStore::with_stops(stops(4, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    planner.plan_route(&request(1, 4.0)).await.expect("full cycle");
    assert!(store.list_unvisited().await.expect("read").is_empty());

    let route = planner.plan_route(&request(2, 2.0)).await.expect("new cycle");

    assert_eq!(route.sequence, ids(&[1, 2]));
    assert_eq!(unvisited_ids(&store.list_unvisited().await.expect("read")), ids(&[3, 4]));
    assert_eq!(store.last_visited(StopId(1)).await.expect("read"), Some(date(2)));
    assert_eq!(store.last_visited(StopId(4)).await.expect("read"), Some(date(1)));
}

#[tokio::test]
async fn empty_registry_is_an_error_and_stores_nothing() {
    let store = Arc::new(MemoryStore::new());
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(7, 10.0)).await.unwrap_err();

    assert!(matches!(err, PlanError::EmptyFleet { date: planned } if planned == date(7)));
    assert!(store.routes(None).await.expect("read").is_empty());
    assert_eq!(planner.route_state(date(7)).await.expect("state"), RouteState::Absent);
}

#[tokio::test]
async fn forecast_failure_leaves_state_untouched() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let planner = planner(store.clone(), Arc::new(Broken), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(8, 10.0)).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::ForecastUnavailable { source: ProviderError::Unavailable(_), .. }
    ));
    assert!(store.find(date(8)).await.expect("read").is_none());
    assert_eq!(store.list_unvisited().await.expect("read").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_forecast_times_out() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let planner = planner(store.clone(), Arc::new(Sleepy), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(9, 10.0)).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::ForecastUnavailable { source: ProviderError::Timeout(_), .. }
    ));
    assert!(store.routes(None).await.expect("read").is_empty());
}

#[tokio::test]
async fn missing_prediction_is_a_forecast_failure() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let planner = planner(store, Arc::new(Fixed(HashMap::new())), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(10, 10.0)).await.unwrap_err();

    assert!(matches!(err, PlanError::ForecastUnavailable { .. }));
}

#[tokio::test]
async fn negative_prediction_is_rejected() {
    let weights = HashMap::from([(1, 1.0), (2, -0.5)]);
    let store = Arc::new(MemoryStore::with_stops(stops(2, 1.0)));
    let planner = planner(store, Arc::new(Fixed(weights)), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(10, 10.0)).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::ForecastUnavailable { source: ProviderError::InvalidResponse(_), .. }
    ));
}

#[tokio::test]
async fn distance_failure_aborts_nearest_neighbor_tour() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(NoDistances), TourPolicy::NearestNeighbor);

    let err = planner.plan_route(&request(11, 10.0)).await.unwrap_err();

    assert!(matches!(err, PlanError::DistanceUnavailable { .. }));
    assert!(store.find(date(11)).await.expect("read").is_none());
    assert_eq!(store.list_unvisited().await.expect("read").len(), 3);
}

#[tokio::test]
async fn distance_failure_only_skips_edges_for_sorted_tour() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(NoDistances), TourPolicy::SortedById);

    let route = planner.plan_route(&request(12, 10.0)).await.expect("route survives");

    assert_eq!(route.sequence, ids(&[1, 2, 3]));
    assert!(store.edges(route.id).await.expect("read").is_empty());
    assert!(store.list_unvisited().await.expect("read").is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_touching_state() {
    let store = Arc::new(MemoryStore::with_stops(stops(2, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(13, -1.0)).await.unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)));
    let err = planner.plan_route(&request(13, f64::NAN)).await.unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)));

    assert!(matches!(
        PlanRequest::parse(date(13), "Monday", false, "Snowy", 5.0),
        Err(PlanError::Validation(_))
    ));
    assert!(matches!(
        PlanRequest::parse(date(13), "Someday", false, "Sunny", 5.0),
        Err(PlanError::Validation(_))
    ));
    let parsed = PlanRequest::parse(date(13), "friday", true, "Cloudy", 5.0).expect("valid");
    assert_eq!(parsed.context.day, DayOfWeek::Friday);

    assert!(store.routes(None).await.expect("read").is_empty());
}

#[tokio::test]
async fn zero_capacity_stores_an_empty_route() {
    let store = Arc::new(MemoryStore::with_stops(stops(2, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let route = planner.plan_route(&request(14, 0.0)).await.expect("empty route");

    assert!(route.sequence.is_empty());
    assert_eq!(store.list_unvisited().await.expect("read").len(), 2);
    assert_eq!(planner.route_for(date(14)).await.expect("read"), Some(route));
}

#[tokio::test]
async fn lost_creation_race_returns_the_winner() {
    let mut registered = stops(4, 1.0);
    registered.push(Stop::new(StopId(99), 0, 1000.0));
    let store = Arc::new(Interfering::new(MemoryStore::with_stops(registered), Hook::RivalRoute));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let route = planner.plan_route(&request(15, 3.0)).await.expect("winner returned");

    assert_eq!(route.sequence, ids(&[99]));
    // The discarded draft wrote nothing.
    assert_eq!(store.list_unvisited().await.expect("read").len(), 5);
    assert_eq!(store.routes(None).await.expect("read").len(), 1);
}

#[tokio::test]
async fn stale_selection_is_redrafted() {
    let store = Arc::new(Interfering::new(MemoryStore::with_stops(stops(6, 1.0)), Hook::ClaimStops));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let route = planner.plan_route(&request(16, 2.0)).await.expect("redrafted");

    // The first draft picked 1 and 2, which were claimed before its commit.
    assert_eq!(route.sequence, ids(&[3, 4]));
    assert_eq!(unvisited_ids(&store.list_unvisited().await.expect("read")), ids(&[5, 6]));
}

#[tokio::test]
async fn persistent_contention_gives_up_after_the_attempt_limit() {
    let store = Arc::new(Interfering::new(MemoryStore::with_stops(stops(6, 1.0)), Hook::ClaimEveryTime));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    let err = planner.plan_route(&request(17, 2.0)).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::Contention { date: contended, attempts: 3 } if contended == date(17)
    ));
    assert!(store.routes(None).await.expect("read").is_empty());
    assert!(store.inner.snapshot().await.visit_records().is_empty());
    assert_eq!(planner.route_state(date(17)).await.expect("state"), RouteState::Absent);
}

#[tokio::test]
async fn route_state_is_computing_while_a_plan_runs() {
    let store = Arc::new(MemoryStore::with_stops(stops(3, 1.0)));
    let gate = Arc::new(Gated::default());
    let planner = Arc::new(planner(store, gate.clone(), Arc::new(Line), TourPolicy::SortedById));

    let running = tokio::spawn({
        let planner = Arc::clone(&planner);
        async move { planner.plan_route(&request(18, 2.0)).await }
    });
    gate.entered.notified().await;

    assert_eq!(planner.route_state(date(18)).await.expect("state"), RouteState::Computing);
    assert_eq!(planner.route_state(date(19)).await.expect("state"), RouteState::Absent);

    gate.release.notify_one();
    let route = running.await.expect("task finished").expect("route planned");

    assert_eq!(route.sequence, ids(&[1, 2]));
    assert_eq!(planner.route_state(date(18)).await.expect("state"), RouteState::Cached);
}

#[tokio::test]
async fn collaborator_queries_reflect_stored_routes() {
    let store = Arc::new(MemoryStore::with_stops(stops(5, 1.0)));
    let planner = planner(store.clone(), Arc::new(PriorWeight::default()), Arc::new(Line), TourPolicy::SortedById);

    planner.plan_route(&request(20, 2.0)).await.expect("day one");
    planner.plan_route(&request(21, 2.0)).await.expect("day two");

    assert!(planner.is_scheduled(date(20), StopId(2)).await.expect("read"));
    assert!(!planner.is_scheduled(date(20), StopId(3)).await.expect("read"));
    assert!(!planner.is_scheduled(date(22), StopId(1)).await.expect("read"));

    let history = planner.history(None).await.expect("read");
    let dates: Vec<_> = history.iter().map(|route| route.date).collect();
    assert_eq!(dates, vec![date(20), date(21)]);
    assert_eq!(planner.history(Some(date(21))).await.expect("read").len(), 1);

    let last: BTreeSet<StopId> = planner
        .last_visited_all()
        .await
        .expect("read")
        .into_iter()
        .map(|visit| visit.stop)
        .collect();
    assert_eq!(last, ids(&[1, 2, 3, 4]).into_iter().collect());
    assert_eq!(planner.last_visited(StopId(5)).await.expect("read"), None);
    assert_eq!(planner.last_visited(StopId(4)).await.expect("read"), Some(date(21)));

    assert_eq!(planner.edge_distance(StopId(4), StopId(3)).await.expect("edge"), 1.0);
    assert!(planner.edge_distance(StopId(2), StopId(3)).await.is_err());

    planner.shutdown().await.expect("memory store closes");
    assert_eq!(store.routes(None).await.expect("read").len(), 2);
}
