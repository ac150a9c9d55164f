//! Distance provider over a precomputed symmetric matrix.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use kerbside_core::{
    model::StopId,
    ports::{DistancePort, ProviderError},
};

const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// On-disk shape: row `i` and column `i` both belong to `stops[i]`.
#[derive(Debug, Deserialize)]
struct MatrixFile {
    stops: Vec<StopId>,
    distances: Vec<Vec<f64>>,
}

/// Static distance table keyed by stop identifier.
#[derive(Debug, Clone)]
pub struct MatrixDistance {
    index: HashMap<StopId, usize>,
    rows: Vec<Vec<f64>>,
}

impl MatrixDistance {
    /// Validate and index a square matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidResponse`] when the matrix is not square,
    /// repeats a stop, holds a negative or non-finite value, or is not symmetric.
    pub fn new(stops: Vec<StopId>, rows: Vec<Vec<f64>>) -> Result<Self, ProviderError> {
        let size = stops.len();
        if rows.len() != size || rows.iter().any(|row| row.len() != size) {
            return Err(ProviderError::InvalidResponse(format!(
                "distance matrix must be {size}x{size}"
            )));
        }

        let mut index = HashMap::with_capacity(size);
        for (position, stop) in stops.iter().enumerate() {
            if index.insert(*stop, position).is_some() {
                return Err(ProviderError::InvalidResponse(format!(
                    "stop {stop} appears twice in the distance matrix"
                )));
            }
        }

        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, value) in row.iter().enumerate() {
                if !value.is_finite() || *value < 0.0 {
                    return Err(ProviderError::InvalidResponse(format!(
                        "distance at ({row_index}, {col_index}) is {value}"
                    )));
                }
                let mirrored = rows
                    .get(col_index)
                    .and_then(|other| other.get(row_index))
                    .copied()
                    .unwrap_or(f64::NAN);
                if (value - mirrored).abs() > SYMMETRY_TOLERANCE {
                    return Err(ProviderError::InvalidResponse(format!(
                        "distance matrix is not symmetric at ({row_index}, {col_index})"
                    )));
                }
            }
        }

        Ok(Self { index, rows })
    }

    /// Parse a JSON document of the form `{"stops": [...], "distances": [[...]]}`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unavailable`] for malformed JSON and the errors of [`Self::new`].
    pub fn from_json(text: &str) -> Result<Self, ProviderError> {
        let file: MatrixFile = serde_json::from_str(text)
            .map_err(|err| ProviderError::Unavailable(format!("distance matrix: {err}")))?;
        Self::new(file.stops, file.distances)
    }

    /// Read and parse a matrix file.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unavailable`] when the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ProviderError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            ProviderError::Unavailable(format!("distance matrix {}: {err}", path.display()))
        })?;
        let matrix = Self::from_json(&text)?;
        debug!(path = %path.display(), stops = matrix.len(), "distance matrix loaded");
        Ok(matrix)
    }

    /// Number of stops covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix covers no stops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, stop: StopId) -> Result<usize, ProviderError> {
        self.index
            .get(&stop)
            .copied()
            .ok_or(ProviderError::UnknownStop(stop))
    }
}

#[async_trait]
impl DistancePort for MatrixDistance {
    async fn distance(&self, from: StopId, to: StopId) -> Result<f64, ProviderError> {
        let row = self.position(from)?;
        let col = self.position(to)?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .copied()
            .ok_or(ProviderError::UnknownStop(to))
    }
}
