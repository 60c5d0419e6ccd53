//! Schedule entry data model.
//!
//! A `ScheduleEntry` is one monitored room configuration: the sectors to
//! capture, the shift boundaries and the weekdays the entry is active.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays, stored as a bitmask indexed from Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);

    /// Parses weekday names. Full (`Monday`) and short (`Mon`) names are
    /// accepted, case-insensitively.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::EMPTY;
        for name in names {
            let name = name.as_ref().trim();
            let day: Weekday = name
                .parse()
                .map_err(|_| anyhow!("unknown weekday '{name}'"))?;
            set.insert(day);
        }
        Ok(set)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.into_iter().filter(|day| self.contains(*day))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(full_day_name).collect()
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<T: IntoIterator<Item = Weekday>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        DaySet::from_names(&names).map_err(serde::de::Error::custom)
    }
}

pub fn full_day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parses `HH:MM` or `HH:MM:SS[.f]`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|err| anyhow!("invalid time of day '{value}': {err}"))
}

mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M:%S"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}

fn deserialize_sectors<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    Vec::<u32>::deserialize(deserializer).map(dedup_sectors)
}

/// Drops repeated sectors, keeping the first occurrence of each.
pub fn dedup_sectors(sectors: Vec<u32>) -> Vec<u32> {
    let mut seen = Vec::with_capacity(sectors.len());
    for sector in sectors {
        if !seen.contains(&sector) {
            seen.push(sector);
        }
    }
    seen
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Row id when the entry comes from the store. Survives edits to every
    /// other field.
    #[serde(rename = "id", default, skip_serializing)]
    pub store_id: Option<i64>,
    /// Tenant. File sources fill this in from the mapping key.
    #[serde(default)]
    pub client: String,
    pub room: String,
    #[serde(default)]
    pub label: String,
    #[serde(deserialize_with = "deserialize_sectors")]
    pub sectors: Vec<u32>,
    #[serde(with = "time_of_day")]
    pub start: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end: NaiveTime,
    pub days: DaySet,
}

impl ScheduleEntry {
    pub fn new(
        client: impl Into<String>,
        room: impl Into<String>,
        label: impl Into<String>,
        sectors: Vec<u32>,
        start: NaiveTime,
        end: NaiveTime,
        days: DaySet,
    ) -> Self {
        Self {
            store_id: None,
            client: client.into(),
            room: room.into(),
            label: label.into(),
            sectors: dedup_sectors(sectors),
            start,
            end,
            days,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey {
            client: self.client.clone(),
            room: self.room.clone(),
            start: self.start,
            end: self.end,
        }
    }

    /// What jobs and capture sessions are keyed on: the store id when there
    /// is one, otherwise the natural key.
    pub fn entry_id(&self) -> EntryId {
        match self.store_id {
            Some(id) => EntryId::Stored {
                client: self.client.clone(),
                id,
            },
            None => EntryId::Natural(self.key()),
        }
    }
}

/// Identity of an entry across schedule refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub client: String,
    pub room: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}-{}",
            self.client,
            self.room,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryId {
    Stored { client: String, id: i64 },
    Natural(EntryKey),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Stored { client, id } => write!(f, "{client}#{id}"),
            EntryId::Natural(key) => key.fmt(f),
        }
    }
}
