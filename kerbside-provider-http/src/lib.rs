//! Forecast provider calling a remote waste prediction service over HTTP.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kerbside_core::{
    model::{DayContext, Stop, StopId},
    ports::{ForecastPort, ProviderError},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Location and limits of the prediction service.
pub struct HttpForecastConfig {
    /// Base URL; requests go to `{base_url}/predict`.
    pub base_url: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpForecastConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            timeout_secs: 10,
        }
    }
}

/// Feature row sent for each stop, named after the model's training columns.
#[derive(Debug, Serialize)]
struct FeatureRow {
    house_id: u32,
    day_encoded: u8,
    isholiday: u8,
    neighborhood_encoded: u32,
    weather_encoded: u8,
    previous_day_waste: f64,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    rows: Vec<FeatureRow>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    house_id: u32,
    predicted_waste_weight: f64,
}

/// Forecast backed by the prediction service.
pub struct HttpForecaster {
    client: Client,
    base_url: String,
}

impl HttpForecaster {
    /// Create a forecaster with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Network`] when the client cannot be built.
    pub fn new(config: &HttpForecastConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("kerbside/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a forecaster bound to an existing client.
    #[must_use]
    pub fn with_client(client: Client, config: &HttpForecastConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl ForecastPort for HttpForecaster {
    async fn forecast(
        &self,
        stops: &[Stop],
        context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        if stops.is_empty() {
            return Ok(BTreeMap::new());
        }

        let body = feature_rows(stops, context);
        let req = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body);

        let resp = fetch_json::<PredictResponse>(req).await?;
        debug!(stops = stops.len(), predictions = resp.predictions.len(), "forecast received");

        collect_predictions(resp)
    }
}

fn feature_rows(stops: &[Stop], context: &DayContext) -> PredictRequest {
    let rows = stops
        .iter()
        .map(|stop| FeatureRow {
            house_id: stop.id.0,
            day_encoded: context.day.encoded(),
            isholiday: u8::from(context.is_holiday),
            neighborhood_encoded: stop.neighborhood,
            weather_encoded: context.weather.encoded(),
            previous_day_waste: stop.prior_weight,
        })
        .collect();
    PredictRequest { rows }
}

fn collect_predictions(resp: PredictResponse) -> Result<BTreeMap<StopId, f64>, ProviderError> {
    let mut predicted = BTreeMap::new();
    for entry in resp.predictions {
        let stop = StopId(entry.house_id);
        if predicted.insert(stop, entry.predicted_waste_weight).is_some() {
            return Err(ProviderError::InvalidResponse(format!(
                "stop {stop} predicted twice"
            )));
        }
    }
    Ok(predicted)
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ProviderError> {
    req.send()
        .await
        .map_err(ProviderError::from)?
        .error_for_status()
        .map_err(ProviderError::from)?
        .json()
        .await
        .map_err(ProviderError::from)
}
