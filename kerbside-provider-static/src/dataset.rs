//! Stop dataset file: identifiers plus the features the forecast needs.

use std::path::Path;

use serde::Deserialize;

use kerbside_core::{
    model::{Stop, StopId},
    ports::ProviderError,
};

/// One row of the dataset, named after the forecasting model's feature columns.
#[derive(Debug, Deserialize)]
struct DatasetRow {
    house_id: u32,
    #[serde(rename = "neighborhood_encoded", default)]
    neighborhood: u32,
    #[serde(rename = "previous_day_waste", default)]
    prior_weight: f64,
}

/// Parse a JSON array of dataset rows into unvisited stops.
///
/// # Errors
///
/// Returns [`ProviderError::Unavailable`] for malformed JSON and
/// [`ProviderError::InvalidResponse`] for a zero identifier or a negative weight.
pub fn parse_stops(text: &str) -> Result<Vec<Stop>, ProviderError> {
    let rows: Vec<DatasetRow> = serde_json::from_str(text)
        .map_err(|err| ProviderError::Unavailable(format!("stop dataset: {err}")))?;

    rows.into_iter()
        .map(|row| {
            if row.house_id == 0 {
                return Err(ProviderError::InvalidResponse(
                    "stop identifiers must be positive".to_owned(),
                ));
            }
            if !row.prior_weight.is_finite() || row.prior_weight < 0.0 {
                return Err(ProviderError::InvalidResponse(format!(
                    "stop {} has invalid prior weight {}",
                    row.house_id, row.prior_weight
                )));
            }
            Ok(Stop::new(StopId(row.house_id), row.neighborhood, row.prior_weight))
        })
        .collect()
}

/// Read a dataset file.
///
/// # Errors
///
/// Returns [`ProviderError::Unavailable`] when the file cannot be read and the errors of [`parse_stops`].
pub async fn load_stops(path: &Path) -> Result<Vec<Stop>, ProviderError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|err| {
        ProviderError::Unavailable(format!("stop dataset {}: {err}", path.display()))
    })?;
    parse_stops(&text)
}
