//! Schedule window - Decides whether an app may run at a given moment

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};

use super::definition::AppDefinition;
use super::weekday::DayOfWeek;

/// Whether `def` may be started at `now`.
///
/// Closed while `now` is before `suppress_until`, on a day outside
/// `def.days` (empty means every day), or when either time bound that is set
/// is violated. The window never wraps past midnight: a start bound later
/// than the end bound is never open.
pub fn is_eligible(
    def: &AppDefinition,
    now: NaiveDateTime,
    suppress_until: Option<NaiveDateTime>,
) -> bool {
    if suppress_until.is_some_and(|until| now < until) {
        return false;
    }

    if !def.days.is_empty() && !def.days.contains(&DayOfWeek::from_chrono(now.weekday())) {
        return false;
    }

    let time = now.time();
    let start_ok = def.start_time.map(|start| start <= time);
    let end_ok = def.end_time.map(|end| end >= time);

    start_ok.unwrap_or(true) && end_ok.unwrap_or(true)
}

/// Midnight at the start of the calendar day after `now`
pub fn next_day_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Parse `"H"`, `"H:M"` or `"H:M:S"` into a time of day
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut fields = [0u32; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.trim().parse().ok()?;
    }

    NaiveTime::from_hms_opt(fields[0], fields[1], fields[2])
}

/// Format a time of day the way configs store it
pub fn format_time_of_day(time: NaiveTime) -> String {
    if time.second() == 0 {
        format!("{:02}:{:02}", time.hour(), time.minute())
    } else {
        format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
    }
}

/// Human summary of when `def` may run, e.g. `monday,friday 08:00-17:30`
pub fn describe_window(def: &AppDefinition) -> String {
    let days = if def.days.is_empty() {
        "every day".to_string()
    } else {
        def.days
            .iter()
            .map(|day| day.tag())
            .collect::<Vec<_>>()
            .join(",")
    };

    match (def.start_time, def.end_time) {
        (None, None) => days,
        (start, end) => format!(
            "{} {}-{}",
            days,
            start.map(format_time_of_day).unwrap_or_default(),
            end.map(format_time_of_day).unwrap_or_default()
        ),
    }
}
