//! Visiting order construction over a selected stop set.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::model::StopId;
use crate::ports::{DistancePort, ProviderError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How the selected stops are ordered.
pub enum TourPolicy {
    /// Start at the smallest identifier and always move to the closest remaining stop.
    NearestNeighbor,
    /// Ascending identifier order, distances ignored.
    #[default]
    SortedById,
}

/// Dense symmetric distance table over a small set of stops.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMatrix {
    ids: Vec<StopId>,
    data: Vec<f64>,
}

impl LocalMatrix {
    /// Build from stops (ascending) and a row-major `n * n` table.
    ///
    /// Returns `None` if the table size does not match.
    #[must_use]
    pub fn from_rows(ids: Vec<StopId>, data: Vec<f64>) -> Option<Self> {
        (data.len() == ids.len() * ids.len()).then_some(Self { ids, data })
    }

    /// Look up every unordered pair of `stops` once through the provider.
    ///
    /// # Errors
    ///
    /// Returns the first provider failure, or [`ProviderError::Timeout`] when a
    /// lookup exceeds `limit`.
    pub async fn fetch(
        stops: &BTreeSet<StopId>,
        distances: &dyn DistancePort,
        limit: Duration,
    ) -> Result<Self, ProviderError> {
        let ids: Vec<StopId> = stops.iter().copied().collect();
        let size = ids.len();
        let mut data = vec![0.0; size * size];

        for (row, from) in ids.iter().enumerate() {
            for (col, to) in ids.iter().enumerate().skip(row + 1) {
                let distance = lookup(distances, *from, *to, limit).await?;
                if let Some(cell) = data.get_mut(row * size + col) {
                    *cell = distance;
                }
                if let Some(cell) = data.get_mut(col * size + row) {
                    *cell = distance;
                }
            }
        }

        Ok(Self { ids, data })
    }

    /// Distance between two covered stops.
    #[must_use]
    pub fn get(&self, from: StopId, to: StopId) -> Option<f64> {
        let row = self.ids.binary_search(&from).ok()?;
        let col = self.ids.binary_search(&to).ok()?;
        self.cell(row, col)
    }

    fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.data.get(row * self.ids.len() + col).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Visiting order plus the distance table used to build it, if one was needed.
pub struct Tour {
    /// Permutation of the selected stops.
    pub order: Vec<StopId>,
    /// Distances fetched while building the tour.
    pub matrix: Option<LocalMatrix>,
}

/// Order `selected` according to `policy`.
///
/// The output is always a permutation of the input set.
///
/// # Errors
///
/// Returns a [`ProviderError`] when the nearest-neighbor policy cannot obtain a distance.
pub async fn build_tour(
    selected: &BTreeSet<StopId>,
    distances: &dyn DistancePort,
    policy: TourPolicy,
    limit: Duration,
) -> Result<Tour, ProviderError> {
    match policy {
        TourPolicy::SortedById => Ok(Tour {
            order: sorted_by_id(selected),
            matrix: None,
        }),
        TourPolicy::NearestNeighbor => {
            let matrix = LocalMatrix::fetch(selected, distances, limit).await?;
            Ok(Tour {
                order: nearest_neighbor(&matrix),
                matrix: Some(matrix),
            })
        }
    }
}

/// Ascending identifier order.
#[must_use]
pub fn sorted_by_id(selected: &BTreeSet<StopId>) -> Vec<StopId> {
    selected.iter().copied().collect()
}

/// Greedy nearest-neighbor tour anchored at the smallest identifier.
///
/// Ties go to the smaller identifier.
#[must_use]
pub fn nearest_neighbor(matrix: &LocalMatrix) -> Vec<StopId> {
    let size = matrix.ids.len();
    if size == 0 {
        return Vec::new();
    }

    let mut visited = vec![false; size];
    let mut order = Vec::with_capacity(size);
    let mut current = 0;
    if let Some(flag) = visited.get_mut(current) {
        *flag = true;
    }
    order.extend(matrix.ids.get(current).copied());

    while order.len() < size {
        let mut best: Option<(usize, f64)> = None;
        for (candidate, done) in visited.iter().enumerate() {
            if *done {
                continue;
            }
            let distance = matrix.cell(current, candidate).unwrap_or(f64::INFINITY);
            // Strictly closer only: ids are ascending, so ties keep the smaller one.
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((candidate, distance));
            }
        }

        let Some((next, _)) = best else {
            break;
        };
        if let Some(flag) = visited.get_mut(next) {
            *flag = true;
        }
        order.extend(matrix.ids.get(next).copied());
        current = next;
    }

    order
}

async fn lookup(
    distances: &dyn DistancePort,
    from: StopId,
    to: StopId,
    limit: Duration,
) -> Result<f64, ProviderError> {
    let distance = timeout(limit, distances.distance(from, to))
        .await
        .map_err(|_elapsed| ProviderError::Timeout(limit))??;
    if !distance.is_finite() || distance < 0.0 {
        return Err(ProviderError::InvalidResponse(format!(
            "distance {from}->{to} is {distance}"
        )));
    }
    Ok(distance)
}
