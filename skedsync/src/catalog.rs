//! Reading of IVS master catalogs.
//!
//! A master file is mostly free text; session records are the lines starting
//! with `|`, laid out as
//! `|NAME|CODE|DATE|DOY|HH:MM|HH:MM|STATIONS -REMOVED|...`.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::debug;

use crate::error::CycleError;
use crate::session::Session;

/// Parse master catalog lines into sessions sorted by start time.
pub fn parse_master<I, S>(lines: I, year: i32, stations: &BTreeSet<String>) -> Vec<Session>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sessions: Vec<Session> = lines
        .into_iter()
        .filter(|line| line.as_ref().starts_with('|'))
        .filter_map(|line| {
            let line = line.as_ref();
            let parsed = parse_record(line, year, stations);
            if parsed.is_none() {
                debug!("Skipping unparseable master record: {line}");
            }
            parsed
        })
        .collect();
    sessions.sort_by_key(|s| s.start);
    sessions
}

/// Read every given master file and return all sessions in time order.
pub fn read_master(
    files: &[PathBuf],
    year: i32,
    stations: &BTreeSet<String>,
) -> Result<Vec<Session>, CycleError> {
    let mut lines = Vec::new();
    for file in files {
        let content = fs::read_to_string(file).map_err(|source| CycleError::ReadMaster {
            path: file.clone(),
            source,
        })?;
        lines.extend(content.lines().map(str::to_owned));
    }
    Ok(parse_master(lines, year, stations))
}

fn parse_record(line: &str, year: i32, configured: &BTreeSet<String>) -> Option<Session> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 8 {
        return None;
    }
    let code = fields[2];
    if code.is_empty() {
        return None;
    }

    let date = fields[4]
        .parse::<u32>()
        .ok()
        .and_then(|doy| NaiveDate::from_yo_opt(year, doy))
        .or_else(|| NaiveDate::parse_from_str(fields[3], "%Y%m%d").ok())?;
    let time = NaiveTime::parse_from_str(fields[5], "%H:%M").ok()?;
    let duration = parse_duration(fields[6])?;
    if duration <= Duration::zero() {
        return None;
    }

    let start = Utc.from_utc_datetime(&date.and_time(time));
    let end = start.checked_add_signed(duration)?;
    let stations = parse_stations(fields[7]);

    Some(Session::new(code, start, end, stations, configured))
}

fn parse_duration(text: &str) -> Option<Duration> {
    let (hours, minutes) = text.split_once(':')?;
    let hours: i64 = hours.trim().parse().ok()?;
    let minutes: i64 = minutes.trim().parse().ok()?;
    Duration::try_hours(hours)?.checked_add(&Duration::try_minutes(minutes)?)
}

/// Station codes are packed two characters each; anything after `-` lists
/// stations that dropped out of the session.
fn parse_stations(field: &str) -> BTreeSet<String> {
    let active = field.split('-').next().unwrap_or_default();
    let packed: Vec<char> = active.chars().filter(|c| !c.is_whitespace()).collect();
    packed
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| pair.iter().collect::<String>().to_lowercase())
        .collect()
}
