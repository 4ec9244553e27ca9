use std::collections::HashSet;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Timelike, Weekday};
use serde_json::json;
use tracing::warn;

use crate::error::{AppError, AppResult};

const LAST_MINUTE_OF_DAY: i64 = 23 * 60 + 59;

/// Serde adapter storing a `NaiveTime` as `"HH:MM"`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_time_of_day(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn parse_time_of_day(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|err| {
        AppError::validation_with_details(
            "invalid time of day, expected HH:MM",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn minutes_from_midnight(time: NaiveTime) -> i64 {
    (time.hour() as i64) * 60 + (time.minute() as i64)
}

pub fn to_naive_time(total_minutes: i64) -> NaiveTime {
    let clamped = total_minutes.clamp(0, LAST_MINUTE_OF_DAY);
    let hours = (clamped / 60) as u32;
    let minutes = (clamped % 60) as u32;
    NaiveTime::from_hms_opt(hours, minutes, 0).unwrap_or(NaiveTime::MIN)
}

/// End of a block starting at `start`; never wraps past 23:59.
pub fn end_time_after(start: NaiveTime, minutes: i64) -> NaiveTime {
    to_naive_time(minutes_from_midnight(start) + minutes.max(0))
}

/// Shifts by whole days; returns `date` unchanged when the result is out of range.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    let step = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(step)
    } else {
        date.checked_sub_days(step)
    };
    shifted.unwrap_or(date)
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Unknown names are dropped with a warning rather than failing the whole set.
pub fn parse_available_days(names: &[String]) -> HashSet<Weekday> {
    names
        .iter()
        .filter_map(|name| {
            let parsed = parse_weekday(name);
            if parsed.is_none() {
                warn!(target: "app::planner", weekday = %name, "ignoring unknown weekday");
            }
            parsed
        })
        .collect()
}

/// First date at or after `from` whose weekday is available, looking at most `max_search` days ahead.
pub fn next_available_day(
    from: NaiveDate,
    available: &HashSet<Weekday>,
    max_search: i64,
) -> Option<NaiveDate> {
    (0..=max_search.max(0))
        .map(|offset| add_days(from, offset))
        .find(|date| available.contains(&date.weekday()))
}

/// Latest available date in `[floor, date]`.
pub fn latest_available_on_or_before(
    date: NaiveDate,
    floor: NaiveDate,
    available: &HashSet<Weekday>,
) -> Option<NaiveDate> {
    let span = days_between(floor, date);
    (0..=span.max(0))
        .map(|offset| add_days(date, -offset))
        .find(|candidate| available.contains(&candidate.weekday()))
}

/// Number of available dates in `[start, end)`.
pub fn count_available_days(start: NaiveDate, end: NaiveDate, available: &HashSet<Weekday>) -> i64 {
    let span = days_between(start, end);
    (0..span.max(0))
        .map(|offset| add_days(start, offset))
        .filter(|date| available.contains(&date.weekday()))
        .count() as i64
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
