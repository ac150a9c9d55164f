//! Domain data structures for stops, day context, routes, and visit bookkeeping.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Stable, externally assigned identifier of a collection point.
pub struct StopId(pub u32);

impl fmt::Display for StopId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A physical collection point (a house) owned by the registry.
pub struct Stop {
    /// Unique identifier.
    pub id: StopId,
    /// Whether the stop has been serviced in the current cycle.
    #[serde(default)]
    pub visited: bool,
    /// Encoded neighborhood category, a forecast feature.
    pub neighborhood: u32,
    /// Waste weight observed in the prior period, a forecast feature.
    pub prior_weight: f64,
}

impl Stop {
    /// Construct an unvisited stop.
    #[must_use]
    pub fn new(id: StopId, neighborhood: u32, prior_weight: f64) -> Self {
        Self {
            id,
            visited: false,
            neighborhood,
            prior_weight,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Raised when an enumerated day-context value is not recognized.
#[error("Unrecognized {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the enumeration that failed to parse.
    pub kind: &'static str,
    /// Raw input.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Day of the week a route is planned for.
pub enum DayOfWeek {
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
    /// Sunday.
    Sunday,
}

impl DayOfWeek {
    /// All days in model encoding order.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Integer encoding used by the forecasting model (Monday = 0).
    #[must_use]
    pub fn encoded(self) -> u8 {
        match self {
            DayOfWeek::Monday => 0,
            DayOfWeek::Tuesday => 1,
            DayOfWeek::Wednesday => 2,
            DayOfWeek::Thursday => 3,
            DayOfWeek::Friday => 4,
            DayOfWeek::Saturday => 5,
            DayOfWeek::Sunday => 6,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        };
        write!(formatter, "{name}")
    }
}

impl FromStr for DayOfWeek {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownVariant {
                kind: "day of week",
                value: raw.to_owned(),
            })
    }
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
            chrono::Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Weather condition expected on the planned day.
pub enum Weather {
    /// Clear weather.
    Sunny,
    /// Rain.
    Rainy,
    /// Overcast.
    Cloudy,
}

impl Weather {
    /// All conditions in model encoding order.
    pub const ALL: [Weather; 3] = [Weather::Sunny, Weather::Rainy, Weather::Cloudy];

    /// Integer encoding used by the forecasting model (Sunny = 0).
    #[must_use]
    pub fn encoded(self) -> u8 {
        match self {
            Weather::Sunny => 0,
            Weather::Rainy => 1,
            Weather::Cloudy => 2,
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weather::Sunny => "Sunny",
            Weather::Rainy => "Rainy",
            Weather::Cloudy => "Cloudy",
        };
        write!(formatter, "{name}")
    }
}

impl FromStr for Weather {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Weather::ALL
            .into_iter()
            .find(|weather| weather.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownVariant {
                kind: "weather",
                value: raw.to_owned(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Calendar features handed to the waste forecast.
pub struct DayContext {
    /// Day of the week.
    pub day: DayOfWeek,
    /// Whether the day is a public holiday.
    pub is_holiday: bool,
    /// Expected weather.
    pub weather: Weather,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Predicted waste weight of one stop for one day. Never persisted on its own.
pub struct ForecastReading {
    /// Stop the prediction applies to.
    pub stop: StopId,
    /// Day the prediction was made for.
    pub context: DayContext,
    /// Predicted weight, non-negative.
    pub predicted_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Storage-assigned identifier of a persisted route.
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Ordered stops planned for one calendar date. Immutable once stored.
pub struct Route {
    /// Storage identifier, referenced by edges.
    pub id: RouteId,
    /// Calendar date, unique across routes.
    pub date: NaiveDate,
    /// Visiting order, no duplicates.
    pub sequence: Vec<StopId>,
    /// When the route was first computed.
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Whether the stop is part of this route.
    #[must_use]
    pub fn contains(&self, stop: StopId) -> bool {
        self.sequence.contains(&stop)
    }

    /// Consecutive stop pairs in visiting order.
    pub fn legs(&self) -> impl Iterator<Item = (StopId, StopId)> + '_ {
        self.sequence.windows(2).filter_map(|pair| match pair {
            [from, to] => Some((*from, *to)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Realized distance between two consecutive stops of a route.
pub struct RouteEdge {
    /// Route the edge belongs to.
    pub route: RouteId,
    /// Departure stop.
    pub from: StopId,
    /// Arrival stop.
    pub to: StopId,
    /// Distance looked up when the route was planned.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Append-only record that a stop was included in the route of a date.
pub struct VisitRecord {
    /// Route date.
    pub date: NaiveDate,
    /// Visited stop.
    pub stop: StopId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Most recent visit date of a stop.
pub struct LastVisit {
    /// Stop identifier.
    pub stop: StopId,
    /// Latest date the stop appeared in a route.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Input of a single planning request.
pub struct PlanRequest {
    /// Date the route is planned for; the idempotency key.
    pub date: NaiveDate,
    /// Calendar features for the forecast.
    pub context: DayContext,
    /// Maximum aggregate predicted weight the truck can carry.
    pub truck_capacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Planning state of a date key.
pub enum RouteState {
    /// No route stored and nobody is planning the date.
    Absent,
    /// A planner currently holds the date.
    Computing,
    /// A route is stored for the date.
    Cached,
}
