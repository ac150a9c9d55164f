//! Baseline forecaster scaling each stop's prior-period weight by calendar factors.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kerbside_core::{
    model::{DayContext, DayOfWeek, Stop, StopId, Weather},
    ports::{ForecastPort, ProviderError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Multipliers applied to a stop's prior-period weight.
pub struct ProfileForecastConfig {
    /// Factor for Monday to Friday.
    pub weekday: f64,
    /// Factor for Saturday and Sunday.
    pub weekend: f64,
    /// Extra factor on public holidays.
    pub holiday: f64,
    /// Factor for sunny days.
    pub sunny: f64,
    /// Factor for rainy days.
    pub rainy: f64,
    /// Factor for cloudy days.
    pub cloudy: f64,
    /// Per-neighborhood factor; missing neighborhoods use 1.0.
    pub neighborhoods: HashMap<u32, f64>,
}

impl Default for ProfileForecastConfig {
    fn default() -> Self {
        Self {
            weekday: 1.0,
            weekend: 1.2,
            holiday: 1.3,
            sunny: 1.0,
            rainy: 0.9,
            cloudy: 1.0,
            neighborhoods: HashMap::new(),
        }
    }
}

/// Deterministic forecast: `prior_weight * day * holiday * weather * neighborhood`.
#[derive(Debug, Clone, Default)]
pub struct ProfileForecaster {
    config: ProfileForecastConfig,
}

impl ProfileForecaster {
    /// Create a forecaster with the given factors.
    #[must_use]
    pub fn new(config: ProfileForecastConfig) -> Self {
        Self { config }
    }

    /// Predicted weight of one stop.
    #[must_use]
    pub fn predict(&self, stop: &Stop, context: &DayContext) -> f64 {
        let factors = &self.config;
        let day = match context.day {
            DayOfWeek::Saturday | DayOfWeek::Sunday => factors.weekend,
            DayOfWeek::Monday
            | DayOfWeek::Tuesday
            | DayOfWeek::Wednesday
            | DayOfWeek::Thursday
            | DayOfWeek::Friday => factors.weekday,
        };
        let holiday = if context.is_holiday { factors.holiday } else { 1.0 };
        let weather = match context.weather {
            Weather::Sunny => factors.sunny,
            Weather::Rainy => factors.rainy,
            Weather::Cloudy => factors.cloudy,
        };
        let neighborhood = factors
            .neighborhoods
            .get(&stop.neighborhood)
            .copied()
            .unwrap_or(1.0);

        (stop.prior_weight * day * holiday * weather * neighborhood).max(0.0)
    }
}

#[async_trait]
impl ForecastPort for ProfileForecaster {
    async fn forecast(
        &self,
        stops: &[Stop],
        context: &DayContext,
    ) -> Result<BTreeMap<StopId, f64>, ProviderError> {
        stops
            .iter()
            .map(|stop| {
                let weight = self.predict(stop, context);
                if weight.is_finite() {
                    Ok((stop.id, weight))
                } else {
                    Err(ProviderError::InvalidResponse(format!(
                        "non-finite prediction for stop {}",
                        stop.id
                    )))
                }
            })
            .collect()
    }
}
