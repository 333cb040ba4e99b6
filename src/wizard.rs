//! Create wizard - Interactive prompts that write a new app config

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;

use crate::core::DayOfWeek;
use crate::persistence::ConfigStore;

/// A weekday list typed at the days prompt that cannot be used
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DayListError {
    #[error("at most 7 days can be given, got {0}")]
    TooMany(usize),

    #[error("{0:?} is not a day number")]
    NotANumber(String),

    #[error("day {0} is out of range (1-7)")]
    OutOfRange(u32),
}

/// Parse a comma-separated list of day numbers, 1 (Sunday) through 7
/// (Saturday). Empty input means every day. Repeated days are kept once.
pub fn parse_day_list(input: &str) -> Result<Vec<DayOfWeek>, DayListError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<&str> = input.split(',').map(str::trim).collect();
    if entries.len() > DayOfWeek::all().len() {
        return Err(DayListError::TooMany(entries.len()));
    }

    let mut days = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.is_empty() || !entry.chars().all(|c| c.is_ascii_digit()) {
            return Err(DayListError::NotANumber(entry.to_string()));
        }
        let number: u32 = entry
            .parse()
            .map_err(|_| DayListError::NotANumber(entry.to_string()))?;
        let day = DayOfWeek::from_human_ordinal(number).ok_or(DayListError::OutOfRange(number))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }

    Ok(days)
}

/// Walk the operator through creating one app config.
///
/// Missing `name` and `program` are prompted for on `input`. Returns the new
/// app id, or `None` when the answers were rejected; the reason has already
/// been written to `output`.
pub fn run<R: BufRead, W: Write>(
    store: &ConfigStore,
    name: Option<String>,
    program: Option<PathBuf>,
    input: &mut R,
    output: &mut W,
) -> Result<Option<String>> {
    let name = match name {
        Some(name) => name,
        None => prompt(input, output, "Name: ")?,
    };
    let program = match program {
        Some(program) => program,
        None => PathBuf::from(prompt(input, output, "Program: ")?),
    };

    if !program.exists() {
        writeln!(output, "The program \"{}\" is invalid", program.display())?;
        return Ok(None);
    }

    print_day_menu(output)?;
    let answer = prompt(input, output, "Days: ")?;
    let days = match parse_day_list(&answer) {
        Ok(days) => days,
        Err(e) => {
            writeln!(output, "Invalid days: {}", e)?;
            print_day_help(output)?;
            return Ok(None);
        }
    };

    match store.create(&name, &program, &days) {
        Ok(id) => {
            writeln!(output, "Config created: {}", store.path_for(&id).display())?;
            Ok(Some(id))
        }
        Err(e) => {
            warn!("Failed to create config for '{}': {}", name, e);
            writeln!(output, "Failed to create config: {}", e)?;
            Ok(None)
        }
    }
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    write!(output, "{}", label)?;
    output.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .with_context(|| format!("Failed to read answer for {}", label.trim_end_matches([':', ' '])))?;
    Ok(line.trim().to_string())
}

fn print_day_menu<W: Write>(output: &mut W) -> Result<()> {
    writeln!(output, "Days to run on, separated by commas (,)")?;
    writeln!(output, "Leave empty to run on every day")?;
    for (index, day) in DayOfWeek::all().iter().enumerate() {
        writeln!(output, "{} - {}", index + 1, day.label())?;
    }
    Ok(())
}

fn print_day_help<W: Write>(output: &mut W) -> Result<()> {
    writeln!(
        output,
        "Enter up to 7 day numbers separated by commas, each from 1 (Sunday) to 7 (Saturday)"
    )?;
    Ok(())
}
