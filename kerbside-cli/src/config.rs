//! JSON configuration file of the `kerbside` binary.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use kerbside_core::PlannerConfig;
use kerbside_provider_http::HttpForecastConfig;
use kerbside_provider_static::ProfileForecastConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct CliConfig {
    /// Planning state document.
    pub(crate) state_path: PathBuf,
    /// Precomputed distance matrix.
    pub(crate) matrix_path: PathBuf,
    /// Stop dataset used by `seed`.
    pub(crate) dataset_path: PathBuf,
    pub(crate) forecast: ForecastSource,
    pub(crate) planner: PlannerConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("kerbside-state.json"),
            matrix_path: PathBuf::from("distances.json"),
            dataset_path: PathBuf::from("stops.json"),
            forecast: ForecastSource::default(),
            planner: PlannerConfig::default(),
        }
    }
}

/// Where waste predictions come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub(crate) enum ForecastSource {
    Profile(ProfileForecastConfig),
    Http(HttpForecastConfig),
}

impl Default for ForecastSource {
    fn default() -> Self {
        ForecastSource::Profile(ProfileForecastConfig::default())
    }
}

/// Read the config file; a missing file yields the defaults.
pub(crate) async fn load(path: &Path) -> Result<CliConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(CliConfig::default()),
        Err(err) => Err(err).with_context(|| format!("reading config file {}", path.display())),
    }
}
