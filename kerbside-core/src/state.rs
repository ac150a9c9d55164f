//! Planning state tables shared by every store implementation.
//!
//! All mutating methods validate first and only then write, so a failed call
//! leaves the tables untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LastVisit, Route, RouteEdge, RouteId, Stop, StopId, VisitRecord};
use crate::ports::{RouteCommit, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Stops, routes, route edges and visit records.
pub struct PlanningTables {
    #[serde(default)]
    stops: BTreeMap<StopId, Stop>,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    route_edges: Vec<RouteEdge>,
    #[serde(default)]
    visit_records: Vec<VisitRecord>,
    #[serde(default)]
    next_route_id: u64,
}

impl PlanningTables {
    /// Empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update stops, keeping the visited flag of known ones.
    pub fn register(&mut self, stops: Vec<Stop>) {
        for stop in stops {
            let visited = self
                .stops
                .get(&stop.id)
                .map_or(stop.visited, |known| known.visited);
            self.stops.insert(stop.id, Stop { visited, ..stop });
        }
    }

    /// All stops ordered by identifier.
    #[must_use]
    pub fn stops(&self) -> Vec<Stop> {
        self.stops.values().cloned().collect()
    }

    /// Unvisited stops ordered by identifier.
    #[must_use]
    pub fn list_unvisited(&self) -> Vec<Stop> {
        self.stops
            .values()
            .filter(|stop| !stop.visited)
            .cloned()
            .collect()
    }

    /// Flag the stops as visited.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownStop`] if any identifier is not registered.
    pub fn mark_visited(&mut self, stops: &BTreeSet<StopId>) -> Result<(), StoreError> {
        self.ensure_known(stops.iter().copied())?;
        for id in stops {
            if let Some(stop) = self.stops.get_mut(id) {
                stop.visited = true;
            }
        }
        Ok(())
    }

    /// Clear every visited flag.
    pub fn reset_all(&mut self) {
        for stop in self.stops.values_mut() {
            stop.visited = false;
        }
    }

    /// Route stored for the date.
    #[must_use]
    pub fn find(&self, date: NaiveDate) -> Option<&Route> {
        self.routes.iter().find(|route| route.date == date)
    }

    /// Store a new route.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the date is taken, [`StoreError::UnknownStop`]
    /// for unregistered stops and [`StoreError::Backend`] for a sequence with repeats.
    pub fn create(
        &mut self,
        date: NaiveDate,
        sequence: Vec<StopId>,
        created_at: DateTime<Utc>,
    ) -> Result<Route, StoreError> {
        self.check_new_route(date, &sequence)?;
        Ok(self.insert_route(date, sequence, created_at))
    }

    /// Persist a planning run: reset on wraparound, create the route, mark and record visits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the date is taken and
    /// [`StoreError::StaleSelection`] when the registry moved on since the plan was drafted.
    pub fn commit(
        &mut self,
        plan: RouteCommit,
        created_at: DateTime<Utc>,
    ) -> Result<Route, StoreError> {
        self.check_new_route(plan.date, &plan.sequence)?;

        if plan.wraparound {
            // A wraparound is only valid while the whole cycle is still complete.
            if let Some(pending) = self.stops.values().find(|stop| !stop.visited) {
                return Err(StoreError::StaleSelection(pending.id));
            }
        } else if let Some(taken) = plan
            .sequence
            .iter()
            .find(|id| self.stops.get(id).is_some_and(|stop| stop.visited))
        {
            return Err(StoreError::StaleSelection(*taken));
        }

        if plan.wraparound {
            self.reset_all();
        }
        for id in &plan.sequence {
            if let Some(stop) = self.stops.get_mut(id) {
                stop.visited = true;
            }
        }
        self.visit_records
            .extend(plan.sequence.iter().map(|stop| VisitRecord {
                date: plan.date,
                stop: *stop,
            }));

        Ok(self.insert_route(plan.date, plan.sequence, created_at))
    }

    /// Store edges for an existing route.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown route and [`StoreError::Backend`]
    /// when an edge is negative or tagged with another route.
    pub fn record_edges(&mut self, route: RouteId, edges: &[RouteEdge]) -> Result<(), StoreError> {
        if !self.routes.iter().any(|stored| stored.id == route) {
            return Err(StoreError::NotFound(format!("route {route}")));
        }
        if let Some(stray) = edges.iter().find(|edge| edge.route != route) {
            return Err(StoreError::Backend(format!(
                "edge {}->{} belongs to route {}, not {route}",
                stray.from, stray.to, stray.route
            )));
        }
        if let Some(negative) = edges
            .iter()
            .find(|edge| !edge.distance.is_finite() || edge.distance < 0.0)
        {
            return Err(StoreError::Backend(format!(
                "edge {}->{} has invalid distance {}",
                negative.from, negative.to, negative.distance
            )));
        }
        self.route_edges.extend_from_slice(edges);
        Ok(())
    }

    /// Edges of a route in insertion order.
    #[must_use]
    pub fn edges(&self, route: RouteId) -> Vec<RouteEdge> {
        self.route_edges
            .iter()
            .filter(|edge| edge.route == route)
            .copied()
            .collect()
    }

    /// Routes ordered by date, optionally only the one for `date`.
    #[must_use]
    pub fn routes(&self, date: Option<NaiveDate>) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .filter(|route| date.is_none_or(|wanted| route.date == wanted))
            .cloned()
            .collect();
        routes.sort_by_key(|route| route.date);
        routes
    }

    /// Visit log in append order.
    #[must_use]
    pub fn visit_records(&self) -> &[VisitRecord] {
        &self.visit_records
    }

    /// Max visit date of a stop.
    #[must_use]
    pub fn last_visited(&self, stop: StopId) -> Option<NaiveDate> {
        self.visit_records
            .iter()
            .filter(|record| record.stop == stop)
            .map(|record| record.date)
            .max()
    }

    /// Max visit date of every visited stop, ordered by stop.
    #[must_use]
    pub fn last_visited_all(&self) -> Vec<LastVisit> {
        let mut latest: BTreeMap<StopId, NaiveDate> = BTreeMap::new();
        for record in &self.visit_records {
            latest
                .entry(record.stop)
                .and_modify(|date| *date = (*date).max(record.date))
                .or_insert(record.date);
        }
        latest
            .into_iter()
            .map(|(stop, date)| LastVisit { stop, date })
            .collect()
    }

    /// Distance of the unordered pair in the latest route where the stops were consecutive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no recorded edge joins the two stops.
    pub fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError> {
        let mut routes: Vec<&Route> = self.routes.iter().collect();
        routes.sort_by(|left, right| right.date.cmp(&left.date));

        routes
            .into_iter()
            .find_map(|route| {
                self.route_edges.iter().find(|edge| {
                    edge.route == route.id
                        && ((edge.from == first && edge.to == second)
                            || (edge.from == second && edge.to == first))
                })
            })
            .map(|edge| edge.distance)
            .ok_or_else(|| StoreError::NotFound(format!("distance between {first} and {second}")))
    }

    fn ensure_known(&self, ids: impl IntoIterator<Item = StopId>) -> Result<(), StoreError> {
        match ids.into_iter().find(|id| !self.stops.contains_key(id)) {
            Some(unknown) => Err(StoreError::UnknownStop(unknown)),
            None => Ok(()),
        }
    }

    fn check_new_route(&self, date: NaiveDate, sequence: &[StopId]) -> Result<(), StoreError> {
        if self.find(date).is_some() {
            return Err(StoreError::Conflict(date));
        }
        self.ensure_known(sequence.iter().copied())?;
        let distinct: BTreeSet<&StopId> = sequence.iter().collect();
        if distinct.len() != sequence.len() {
            return Err(StoreError::Backend(format!(
                "route for {date} repeats a stop"
            )));
        }
        Ok(())
    }

    fn insert_route(
        &mut self,
        date: NaiveDate,
        sequence: Vec<StopId>,
        created_at: DateTime<Utc>,
    ) -> Route {
        self.next_route_id += 1;
        let route = Route {
            id: RouteId(self.next_route_id),
            date,
            sequence,
            created_at,
        };
        self.routes.push(route.clone());
        route
    }
}
