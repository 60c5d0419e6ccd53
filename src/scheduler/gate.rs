use chrono::{Datelike, NaiveDateTime};

use crate::models::DaySet;

/// True iff the weekday of `now` is one of `days`.
pub fn is_active(days: &DaySet, now: NaiveDateTime) -> bool {
    days.contains(now.weekday())
}
