//! Days of the week - Stable tags and ordinals exchanged with app configs

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::ConfigError;

/// Day of the week, Sunday first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// All days in internal ordinal order (Sunday = 0)
    pub fn all() -> &'static [DayOfWeek] {
        &[
            DayOfWeek::Sunday,
            DayOfWeek::Monday,
            DayOfWeek::Tuesday,
            DayOfWeek::Wednesday,
            DayOfWeek::Thursday,
            DayOfWeek::Friday,
            DayOfWeek::Saturday,
        ]
    }

    /// Tag used in config files
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sunday => "sunday",
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sunday => "Sunday",
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
        }
    }

    /// Zero-based internal ordinal (Sunday = 0)
    pub fn ordinal(&self) -> u32 {
        *self as u32
    }

    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::all().get(ordinal as usize).copied()
    }

    /// Human-facing ordinal, 1 (Sunday) through 7 (Saturday)
    pub fn from_human_ordinal(ordinal: u32) -> Option<Self> {
        ordinal.checked_sub(1).and_then(Self::from_ordinal)
    }

    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        // num_days_from_sunday is always in 0..7
        Self::all()[weekday.num_days_from_sunday() as usize]
    }
}

impl FromStr for DayOfWeek {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::all()
            .iter()
            .find(|day| day.tag().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| ConfigError::UnknownDay(s.to_string()))
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
