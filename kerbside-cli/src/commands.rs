//! Subcommand handlers. Results go to stdout as JSON, diagnostics to stderr.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use clap::ArgMatches;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use kerbside_core::{
    DayOfWeek, DistancePort, ForecastPort, PlanRequest, PlanningStore, RoutePlanner, StopId,
};
use kerbside_provider_http::HttpForecaster;
use kerbside_provider_static::{MatrixDistance, ProfileForecaster, load_stops};
use kerbside_store_json::JsonFileStore;

use crate::config::{CliConfig, ForecastSource};

pub(crate) async fn run(config: &CliConfig, matches: &ArgMatches) -> Result<()> {
    let store: Arc<dyn PlanningStore> = Arc::new(
        JsonFileStore::open(&config.state_path)
            .await
            .with_context(|| format!("opening {}", config.state_path.display()))?,
    );

    let Some((name, sub)) = matches.subcommand() else {
        return Err(anyhow!("no command given"));
    };

    // Only planning needs the distance matrix and the forecaster.
    if name == "plan" {
        let planner = build_planner(store, config).await?;
        let outcome = plan(&planner, sub).await;
        planner.shutdown().await?;
        return outcome;
    }

    let outcome = match name {
        "seed" => seed(store.as_ref(), config).await,
        _ => query(store.as_ref(), name, sub).await,
    };
    store.close().await?;
    outcome
}

async fn build_planner(store: Arc<dyn PlanningStore>, config: &CliConfig) -> Result<RoutePlanner> {
    let forecasts: Arc<dyn ForecastPort> = match &config.forecast {
        ForecastSource::Profile(factors) => Arc::new(ProfileForecaster::new(factors.clone())),
        ForecastSource::Http(http) => Arc::new(HttpForecaster::new(http)?),
    };
    let distances: Arc<dyn DistancePort> = Arc::new(MatrixDistance::load(&config.matrix_path).await?);

    Ok(RoutePlanner::new(
        store,
        forecasts,
        distances,
        config.planner.clone(),
    ))
}

async fn seed(store: &dyn PlanningStore, config: &CliConfig) -> Result<()> {
    let stops = load_stops(&config.dataset_path).await?;
    let count = stops.len();
    store.register(stops).await?;
    info!(stops = count, path = %config.dataset_path.display(), "stops registered");
    emit(&json!({ "registered": count }))
}

async fn plan(planner: &RoutePlanner, sub: &ArgMatches) -> Result<()> {
    let date = required::<NaiveDate>(sub, "DATE")?;
    let capacity = required::<f64>(sub, "CAPACITY")?;
    let day = sub
        .get_one::<String>("day")
        .cloned()
        .unwrap_or_else(|| DayOfWeek::from(date.weekday()).to_string());
    let weather = sub
        .get_one::<String>("weather")
        .map_or("sunny", String::as_str);

    let request = PlanRequest::parse(date, &day, sub.get_flag("holiday"), weather, capacity)?;
    let route = planner.plan_route(&request).await?;
    emit(&route)
}

async fn query(store: &dyn PlanningStore, name: &str, sub: &ArgMatches) -> Result<()> {
    match name {
        "route" => {
            let date = required::<NaiveDate>(sub, "DATE")?;
            emit(&store.find(date).await?)
        }
        "history" => {
            let date = sub.get_one::<NaiveDate>("date").copied();
            emit(&store.routes(date).await?)
        }
        "last-visited" => match sub.get_one::<u32>("STOP") {
            Some(&stop) => {
                let date = store.last_visited(StopId(stop)).await?;
                emit(&json!({ "stop": stop, "date": date }))
            }
            None => emit(&store.last_visited_all().await?),
        },
        "distance" => {
            let from = StopId(required::<u32>(sub, "FROM")?);
            let to = StopId(required::<u32>(sub, "TO")?);
            let distance = store.edge_distance(from, to).await?;
            emit(&json!({ "from": from, "to": to, "distance": distance }))
        }
        "scheduled" => {
            let date = required::<NaiveDate>(sub, "DATE")?;
            let stop = StopId(required::<u32>(sub, "STOP")?);
            let scheduled = store
                .find(date)
                .await?
                .is_some_and(|route| route.contains(stop));
            emit(&json!({ "date": date, "stop": stop, "scheduled": scheduled }))
        }
        other => Err(anyhow!("unknown command {other}")),
    }
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .with_context(|| format!("missing argument {id}"))
}

#[expect(clippy::print_stdout, reason = "command output is the program's result")]
fn emit(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
