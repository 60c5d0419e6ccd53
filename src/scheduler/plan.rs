use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveTime, TimeDelta};
use log::{info, warn};

use crate::models::{CaptureKind, DaySet, ScheduleEntry};

use super::job::JobAction;

/// A job to register, before it has an id or a next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    pub trigger: NaiveTime,
    pub days: DaySet,
    pub lag_days: u64,
    pub action: JobAction,
}

/// Detection fires `offset` after the shift-end capture, wrapping past midnight.
pub fn detection_time(end: NaiveTime, offset: TimeDelta) -> NaiveTime {
    end.overflowing_add_signed(offset).0
}

/// Expands one entry into its capture and detection jobs: a control and a
/// current capture per sector, plus one detection job. An overnight entry's
/// current and detection jobs fire the day after the shift starts, and are
/// gated on the start day.
pub fn expand_entry(entry: &ScheduleEntry, detect_offset: TimeDelta) -> Vec<PlannedJob> {
    if entry.sectors.is_empty() {
        warn!("Schedule entry {} has no sectors; nothing to capture", entry.key());
        return Vec::new();
    }
    if entry.days.is_empty() {
        warn!("Schedule entry {} has no active days; skipping", entry.key());
        return Vec::new();
    }
    let overnight = entry.end <= entry.start;
    if overnight {
        info!(
            "Schedule entry {} ends at or before it starts; treating it as an overnight shift",
            entry.key()
        );
    }
    let end_lag = u64::from(overnight);
    let detect_at = detection_time(entry.end, detect_offset);
    let detect_lag = end_lag + u64::from(detect_at < entry.end);

    let shared = Arc::new(entry.clone());
    let mut jobs = Vec::with_capacity(entry.sectors.len() * 2 + 1);

    for (kind, trigger, lag_days) in [
        (CaptureKind::Control, entry.start, 0),
        (CaptureKind::Current, entry.end, end_lag),
    ] {
        for &sector in &entry.sectors {
            jobs.push(PlannedJob {
                trigger,
                days: entry.days,
                lag_days,
                action: JobAction::Capture {
                    entry: Arc::clone(&shared),
                    sector,
                    kind,
                },
            });
        }
    }

    jobs.push(PlannedJob {
        trigger: detect_at,
        days: entry.days,
        lag_days: detect_lag,
        action: JobAction::Detect { entry: shared },
    });

    jobs
}

/// Expands every entry. The first entry wins when two share a key.
pub fn expand_entries(entries: &[ScheduleEntry], detect_offset: TimeDelta) -> Vec<PlannedJob> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for entry in entries {
        if !seen.insert(entry.key()) {
            warn!("Duplicate schedule entry {} ignored", entry.key());
            continue;
        }
        jobs.extend(expand_entry(entry, detect_offset));
    }
    jobs
}
