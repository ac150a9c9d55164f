//! Static providers for kerbside: a precomputed distance matrix, a baseline
//! forecaster and the stop dataset loader.

/// Stop dataset parsing.
pub mod dataset;
/// Matrix-backed distance provider.
pub mod matrix;
/// Prior-weight forecast provider.
pub mod profile;

pub use dataset::{load_stops, parse_stops};
pub use matrix::MatrixDistance;
pub use profile::{ProfileForecastConfig, ProfileForecaster};
