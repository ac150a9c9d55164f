//! Durable planning store persisting the stop, route, edge and visit tables as one JSON document.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fd_lock::RwLock as FileLock;
use tokio::sync::Mutex;
use tracing::debug;

use kerbside_core::{
    model::{LastVisit, Route, RouteEdge, RouteId, Stop, StopId},
    ports::{HouseRegistry, PlanningStore, RouteCommit, RouteLedger, StoreError},
    state::PlanningTables,
};

/// Store that writes through to a JSON file on every mutation.
///
/// Every operation takes an advisory lock on a sibling `.lock` file and reads
/// the document from disk while holding it, so handles in other processes see
/// each other's commits and the one-route-per-date check runs against the
/// current state. A mutation is written to a temp file, synced, and renamed over
/// the state file before the lock is released.
///
/// File I/O is synchronous and never spans an await.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<FileLock<File>>,
}

impl JsonFileStore {
    /// Open the state file, starting empty when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the lock or state file cannot be read and
    /// [`StoreError::Backend`] when the file does not hold valid planning state.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(sibling(&path, ".lock"))?;
        let store = Self {
            path,
            lock: Mutex::new(FileLock::new(lock_file)),
        };

        let stops = store.read(|tables| tables.stops().len()).await?;
        debug!(path = %store.path.display(), stops, "planning state opened");
        Ok(store)
    }

    async fn read<T>(&self, query: impl FnOnce(&PlanningTables) -> T + Send) -> Result<T, StoreError> {
        let lock = self.lock.lock().await;
        let _shared = lock.read()?;
        let tables = load(&self.path)?;
        Ok(query(&tables))
    }

    async fn mutate<T, F>(&self, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PlanningTables) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut lock = self.lock.lock().await;
        let _exclusive = lock.write()?;
        let mut tables = load(&self.path)?;
        let outcome = apply(&mut tables)?;
        persist(&self.path, &tables)?;
        Ok(outcome)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn load(path: &Path) -> Result<PlanningTables, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map_err(|err| StoreError::Backend(format!("{}: {err}", path.display()))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(PlanningTables::new()),
        Err(err) => Err(StoreError::Io(err)),
    }
}

fn persist(path: &Path, tables: &PlanningTables) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec_pretty(tables)
        .map_err(|err| StoreError::Backend(format!("encoding planning state: {err}")))?;

    let staging = sibling(path, ".tmp");
    let mut file = File::create(&staging)?;
    file.write_all(&encoded)?;
    file.sync_all()?;
    fs::rename(&staging, path)?;
    sync_parent(path)
}

/// Make the rename itself survive a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl HouseRegistry for JsonFileStore {
    async fn register(&self, stops: Vec<Stop>) -> Result<(), StoreError> {
        self.mutate(|tables| {
            tables.register(stops);
            Ok(())
        })
        .await
    }

    async fn stops(&self) -> Result<Vec<Stop>, StoreError> {
        self.read(PlanningTables::stops).await
    }

    async fn list_unvisited(&self) -> Result<Vec<Stop>, StoreError> {
        self.read(PlanningTables::list_unvisited).await
    }

    async fn mark_visited(&self, stops: &BTreeSet<StopId>) -> Result<(), StoreError> {
        self.mutate(|tables| tables.mark_visited(stops)).await
    }

    async fn reset_all(&self) -> Result<(), StoreError> {
        self.mutate(|tables| {
            tables.reset_all();
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RouteLedger for JsonFileStore {
    async fn find(&self, date: NaiveDate) -> Result<Option<Route>, StoreError> {
        self.read(|tables| tables.find(date).cloned()).await
    }

    async fn create(&self, date: NaiveDate, sequence: Vec<StopId>) -> Result<Route, StoreError> {
        self.mutate(|tables| tables.create(date, sequence, Utc::now()))
            .await
    }

    async fn record_edges(&self, route: RouteId, edges: &[RouteEdge]) -> Result<(), StoreError> {
        self.mutate(|tables| tables.record_edges(route, edges)).await
    }

    async fn edges(&self, route: RouteId) -> Result<Vec<RouteEdge>, StoreError> {
        self.read(|tables| tables.edges(route)).await
    }

    async fn routes(&self, date: Option<NaiveDate>) -> Result<Vec<Route>, StoreError> {
        self.read(|tables| tables.routes(date)).await
    }

    async fn last_visited(&self, stop: StopId) -> Result<Option<NaiveDate>, StoreError> {
        self.read(|tables| tables.last_visited(stop)).await
    }

    async fn last_visited_all(&self) -> Result<Vec<LastVisit>, StoreError> {
        self.read(PlanningTables::last_visited_all).await
    }

    async fn edge_distance(&self, first: StopId, second: StopId) -> Result<f64, StoreError> {
        self.read(|tables| tables.edge_distance(first, second))
            .await?
    }
}

#[async_trait]
impl PlanningStore for JsonFileStore {
    async fn commit(&self, plan: RouteCommit) -> Result<Route, StoreError> {
        self.mutate(|tables| tables.commit(plan, Utc::now())).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        // Waits for in-flight operations of this handle; every mutation is already on disk.
        let lock = self.lock.lock().await;
        let _shared = lock.read()?;
        debug!(path = %self.path.display(), "planning state closed");
        Ok(())
    }
}
