use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDateTime, NaiveTime};

use crate::models::{CaptureKind, DaySet, EntryId, ScheduleEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    ControlCapture,
    CurrentCapture,
    Detect,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ControlCapture => "control-capture",
            JobKind::CurrentCapture => "current-capture",
            JobKind::Detect => "detect",
        }
    }
}

/// Stable identity of a job; survives schedule refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub entry: EntryId,
    pub sector: Option<u32>,
    pub kind: JobKind,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sector {
            Some(sector) => write!(f, "{} {} sector {}", self.entry, self.kind.as_str(), sector),
            None => write!(f, "{} {}", self.entry, self.kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Capture {
        entry: Arc<ScheduleEntry>,
        sector: u32,
        kind: CaptureKind,
    },
    Detect {
        entry: Arc<ScheduleEntry>,
    },
}

impl JobAction {
    pub fn entry(&self) -> &ScheduleEntry {
        match self {
            JobAction::Capture { entry, .. } | JobAction::Detect { entry } => &**entry,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobAction::Capture {
                kind: CaptureKind::Control,
                ..
            } => JobKind::ControlCapture,
            JobAction::Capture {
                kind: CaptureKind::Current,
                ..
            } => JobKind::CurrentCapture,
            JobAction::Detect { .. } => JobKind::Detect,
        }
    }

    pub fn key(&self) -> JobKey {
        let sector = match self {
            JobAction::Capture { sector, .. } => Some(*sector),
            JobAction::Detect { .. } => None,
        };
        JobKey {
            entry: self.entry().entry_id(),
            sector,
            kind: self.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub trigger: NaiveTime,
    pub days: DaySet,
    /// Days from the shift start to this job's trigger. The day gate checks
    /// the shift start, not the day the job fires.
    pub lag_days: u64,
    pub action: JobAction,
    pub next_run: NaiveDateTime,
    pub last_run: Option<NaiveDateTime>,
}

impl Job {
    pub fn key(&self) -> JobKey {
        self.action.key()
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_run <= now
    }

    /// The shift-start instant a firing at `now` belongs to.
    pub fn shift_day(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_days(Days::new(self.lag_days)).unwrap_or(now)
    }
}

/// First daily occurrence of `trigger` strictly after `after`.
pub fn next_occurrence(trigger: NaiveTime, after: NaiveDateTime) -> NaiveDateTime {
    let today = after.date().and_time(trigger);
    if today > after {
        today
    } else {
        // Saturates at NaiveDate::MAX, which no wall clock reaches.
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}
