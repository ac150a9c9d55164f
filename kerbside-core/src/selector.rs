//! Greedy capacity-bounded stop selection.

use crate::model::{ForecastReading, StopId};

#[derive(Debug, Clone, Default, PartialEq)]
/// Stops chosen for a day, in selection order (heaviest first).
pub struct Selection {
    /// Selected stops in the order they were accepted.
    pub stops: Vec<StopId>,
    /// Sum of the predicted weights of the selected stops.
    pub total_weight: f64,
}

impl Selection {
    /// Whether nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// Pick stops heaviest first while they fit into `capacity`.
///
/// Readings are ordered by predicted weight descending, ties by stop identifier
/// ascending. A reading is accepted when the running total plus its weight stays
/// within `capacity`; accumulation ends as soon as the running total reaches
/// `capacity`, even if lighter stops would still fit. This is deliberately not
/// an optimal knapsack.
///
/// A non-positive `capacity` or an empty input yields an empty selection.
#[must_use]
pub fn select(forecasts: &[ForecastReading], capacity: f64) -> Selection {
    let mut selection = Selection::default();
    if capacity.is_nan() || capacity <= 0.0 || forecasts.is_empty() {
        return selection;
    }

    let mut ordered: Vec<&ForecastReading> = forecasts.iter().collect();
    ordered.sort_by(|left, right| {
        right
            .predicted_weight
            .total_cmp(&left.predicted_weight)
            .then(left.stop.cmp(&right.stop))
    });

    for reading in ordered {
        if selection.total_weight + reading.predicted_weight <= capacity {
            selection.stops.push(reading.stop);
            selection.total_weight += reading.predicted_weight;
        }
        if selection.total_weight >= capacity {
            break;
        }
    }

    selection
}
