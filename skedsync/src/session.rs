use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// One scheduled observing session taken from a master catalog.
///
/// `relevant_stations` is the intersection of the session's stations with the
/// configured ones, computed once when the catalog is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub code: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stations: BTreeSet<String>,
    pub relevant_stations: BTreeSet<String>,
}

impl Session {
    pub fn new(
        code: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stations: BTreeSet<String>,
        configured: &BTreeSet<String>,
    ) -> Self {
        let relevant_stations = stations.intersection(configured).cloned().collect();
        Session {
            code: code.into().to_lowercase(),
            start,
            end,
            stations,
            relevant_stations,
        }
    }

    /// True while the session is being observed.
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// Supported schedule file formats. The configured list is a priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleType {
    Vex,
    Skd,
}

impl ScheduleType {
    pub fn extension(&self) -> &'static str {
        match self {
            ScheduleType::Vex => "vex",
            ScheduleType::Skd => "skd",
        }
    }
}

impl Display for ScheduleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vex" => Ok(ScheduleType::Vex),
            "skd" => Ok(ScheduleType::Skd),
            other => Err(format!(
                "unrecognised schedule file format '{other}', expected `vex` or `skd`"
            )),
        }
    }
}
