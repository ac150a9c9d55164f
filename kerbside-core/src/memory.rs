//! Process-local store over [`PlanningTables`]. State is lost when the store is dropped.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::model::{LastVisit, Route, RouteEdge, RouteId, Stop, StopId};
use crate::ports::{HouseRegistry, PlanningStore, RouteCommit, RouteLedger, StoreError};
use crate::state::PlanningTables;

/// Store keeping all planning state in memory behind an async lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<PlanningTables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with stops.
    #[must_use]
    pub fn with_stops(stops: Vec<Stop>) -> Self {
        let mut tables = PlanningTables::new();
        tables.register(stops);
        Self::from_tables(tables)
    }

    /// Wrap existing tables.
    #[must_use]
    pub fn from_tables(tables: PlanningTables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Copy of the current tables.
    pub async fn snapshot(&self) -> PlanningTables {
        self.tables.read().await.clone()
    }
}

#[async_trait]
impl HouseRegistry for MemoryStore {
    async fn register(&self, stops: Vec<Stop>) -> Result<(), StoreError> {
        self.tables.write().await.register(stops);
        Ok(())
    }

    async fn stops(&self) -> Result<Vec<Stop>, StoreError> {
        Ok(self.tables.read().await.stops())
    }

    async fn list_unvisited(&self) -> Result<Vec<Stop>, StoreError> {
        Ok(self.tables.read().await.list_unvisited())
    }

    async fn mark_visited(&self, stops: &BTreeSet<StopId>) -> Result<(), StoreError> {
        self.tables.write().await.mark_visited(stops)
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        self.tables.write().await.reset_all();
        Ok(())
    }
}

#[async_trait]
impl RouteLedger for MemoryStore {
    async fn find(&self, date: NaiveDate) -> Result<Option<Route>, StoreError> {
        Ok(self.tables.read().await.find(date).cloned())
    }

    async fn create(&self, date: NaiveDate, sequence: Vec<StopId>) -> Result<Route, StoreError> {
        self.tables.write().await.create(date, sequence, Utc::now())
    }

    async fn record_edges(&self, route: RouteId, edges: &[RouteEdge]) -> Result<(), StoreError> {
        self.tables.write().await.record_edges(route, edges)
    }

    async fn edges(&self, route: RouteId) -> Result<Vec<RouteEdge>, StoreError> {
        Ok(self.tables.read().await.edges(route))
    }

    async fn routes(&self, date: Option<NaiveDate>) -> Result<Vec<Route>, StoreError> {
        Ok(self.tables.read().await.routes(date))
    }

    async fn last_visited(&self, stop: StopId) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.tables.read().await.last_visited(stop))
    }

    async fn last_visited_all(&self) -> Result<Vec<LastVisit>, StoreError> {
        Ok(self.tables.read().await.last_visited_all())
    }

    async fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError> {
        self.tables.read().await.edge_distance(first, second)
    }
}

#[async_trait]
impl PlanningStore for MemoryStore {
    async fn commit(&self, plan: RouteCommit) -> Result<Route, StoreError> {
        self.tables.write().await.commit(plan, Utc::now())
    }
}
