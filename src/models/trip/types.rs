use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Trip header as needed by the engine: who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trip {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
}

/// Role a user holds on a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripRole {
    Owner,
    Editor,
    Voter,
    Viewer,
}

impl TripRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripRole::Owner => "owner",
            TripRole::Editor => "editor",
            TripRole::Voter => "voter",
            TripRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for TripRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TripRole::Owner),
            "editor" => Ok(TripRole::Editor),
            "voter" => Ok(TripRole::Voter),
            "viewer" => Ok(TripRole::Viewer),
            other => Err(format!("unknown trip role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub user_id: i64,
    pub role: TripRole,
}

/// One activity inside an itinerary day.
///
/// Only the fields the engine reasons about are typed; everything else the
/// activity carries (cost, location, tips...) rides along in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Activity {
    pub fn new(name: &str, start_time: Option<&str>) -> Self {
        Activity {
            id: None,
            name: name.to_string(),
            start_time: start_time.map(String::from),
            details: Map::new(),
        }
    }

    /// Parsed start time; `None` when missing or not `HH:MM[:SS]`.
    pub fn start(&self) -> Option<NaiveTime> {
        let raw = self.start_time.as_deref()?.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ItineraryDay {
    pub fn with_activities(activities: Vec<Activity>) -> Self {
        ItineraryDay {
            activities,
            details: Map::new(),
        }
    }
}

/// A trip's day-indexed itinerary plus the version used for optimistic
/// concurrency on save.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub days: Vec<ItineraryDay>,
    pub version: i64,
}
