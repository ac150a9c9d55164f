//! Command line front end for the kerbside daily route planner.

mod commands;
mod config;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Command, arg, value_parser};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("kerbside")
        .about("Plans one waste collection route per day")
        .arg_required_else_help(true)
        .arg(
            arg!(--config [PATH] "Path to the JSON config file")
                .default_value("kerbside.json")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(Command::new("seed").about("Registers the stops of the configured dataset"))
        .subcommand(
            Command::new("plan")
                .about("Returns the route of a date, computing it on first request")
                .arg(arg!(<DATE> "Date to plan, YYYY-MM-DD").value_parser(value_parser!(NaiveDate)))
                .arg(arg!(<CAPACITY> "Truck capacity").value_parser(value_parser!(f64)))
                .arg(arg!(--day [DAY] "Day of week; defaults to the weekday of DATE"))
                .arg(arg!(--weather [WEATHER] "sunny, rainy or cloudy").default_value("sunny"))
                .arg(arg!(--holiday "The date is a public holiday")),
        )
        .subcommand(
            Command::new("route")
                .about("Shows the stored route of a date")
                .arg(arg!(<DATE> "Route date").value_parser(value_parser!(NaiveDate))),
        )
        .subcommand(
            Command::new("history")
                .about("Lists stored routes by date")
                .arg(arg!(--date [DATE] "Only this date").value_parser(value_parser!(NaiveDate))),
        )
        .subcommand(
            Command::new("last-visited")
                .about("Shows when stops were last collected")
                .arg(arg!([STOP] "Stop identifier; all stops when omitted").value_parser(value_parser!(u32))),
        )
        .subcommand(
            Command::new("distance")
                .about("Distance between two stops that were consecutive in a route")
                .arg(arg!(<FROM> "Stop identifier").value_parser(value_parser!(u32)))
                .arg(arg!(<TO> "Stop identifier").value_parser(value_parser!(u32))),
        )
        .subcommand(
            Command::new("scheduled")
                .about("Whether a stop is on the route of a date")
                .arg(arg!(<DATE> "Route date").value_parser(value_parser!(NaiveDate)))
                .arg(arg!(<STOP> "Stop identifier").value_parser(value_parser!(u32))),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("config path has a default")?;
    let config = config::load(config_path).await?;

    commands::run(&config, &matches).await
}
