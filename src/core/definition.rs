//! App definitions - Validated snapshot of one app's configuration

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::error::ConfigError;
use super::schedule::parse_time_of_day;
use super::weekday::DayOfWeek;

/// On-disk representation of an app config (`apps/<id>.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    /// Display name
    pub name: String,
    /// Path to the executable
    pub program: PathBuf,
    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Whether the supervisor may start this app
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Forward the app's stdout into the shared log
    #[serde(default)]
    pub listen_process: bool,
    /// Allowed weekdays by tag; empty means every day
    #[serde(default)]
    pub days: Vec<String>,
    /// Earliest time of day the app may be started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_worktime: Option<String>,
    /// Latest time of day the app may be started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_worktime: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AppRecord {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, days: &[DayOfWeek]) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            enabled: true,
            listen_process: false,
            days: days.iter().map(|day| day.tag().to_string()).collect(),
            start_worktime: None,
            end_worktime: None,
        }
    }
}

/// Configuration for one supervised app.
///
/// Replaced wholesale on every reload; a process already started under an
/// older definition keeps the program and arguments it was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDefinition {
    /// Stable key (config file stem)
    pub id: String,
    /// Display name
    pub name: String,
    /// Path to the executable
    pub program: PathBuf,
    /// Command line arguments
    pub arguments: Vec<String>,
    pub enabled: bool,
    pub listen_output: bool,
    /// Allowed weekdays; empty means every day
    pub days: BTreeSet<DayOfWeek>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl AppDefinition {
    pub fn new(id: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            program: program.into(),
            arguments: Vec::new(),
            enabled: true,
            listen_output: false,
            days: BTreeSet::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Validate a config record. The program must exist on disk.
    pub fn from_record(id: impl Into<String>, record: AppRecord) -> Result<Self, ConfigError> {
        if !record.program.exists() {
            return Err(ConfigError::ProgramNotFound(record.program));
        }

        let days = record
            .days
            .iter()
            .map(|tag| tag.parse::<DayOfWeek>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        let start_time = parse_bound("start_worktime", record.start_worktime.as_deref())?;
        let end_time = parse_bound("end_worktime", record.end_worktime.as_deref())?;

        Ok(Self {
            id: id.into(),
            name: record.name,
            program: record.program,
            arguments: record.args,
            enabled: record.enabled,
            listen_output: record.listen_process,
            days,
            start_time,
            end_time,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_arguments(mut self, args: Vec<String>) -> Self {
        self.arguments = args;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_listen_output(mut self, listen: bool) -> Self {
        self.listen_output = listen;
        self
    }

    pub fn with_days(mut self, days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn with_window(mut self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Get the display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

fn parse_bound(field: &'static str, value: Option<&str>) -> Result<Option<NaiveTime>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_time_of_day(raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidTime {
                field,
                value: raw.to_string(),
            }),
    }
}
