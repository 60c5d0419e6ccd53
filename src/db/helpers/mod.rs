use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};

use crate::models::{parse_time_of_day, DaySet};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub fn parse_time(value: &str, field: &str) -> Result<NaiveTime> {
    parse_time_of_day(value).with_context(|| format!("failed to parse {field}"))
}

pub fn sectors_to_json(sectors: &[u32]) -> Result<String> {
    serde_json::to_string(sectors).context("failed to encode sectors")
}

pub fn sectors_from_json(value: &str) -> Result<Vec<u32>> {
    serde_json::from_str(value).with_context(|| format!("invalid sectors_json '{value}'"))
}

pub fn days_to_json(days: &DaySet) -> Result<String> {
    serde_json::to_string(days).context("failed to encode days")
}

pub fn days_from_json(value: &str) -> Result<DaySet> {
    serde_json::from_str(value).with_context(|| format!("invalid days_json '{value}'"))
}
