use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{NaiveDateTime, TimeDelta};
use uuid::Uuid;

use crate::models::{CaptureKind, EntryId};

/// One firing of a capture kind for an entry. Every sector captured for the
/// same scheduled instant shares the session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    pub id: String,
    pub kind: CaptureKind,
    pub scheduled: NaiveDateTime,
    pub captured: BTreeSet<u32>,
    pub failed: BTreeSet<u32>,
}

impl CaptureSession {
    fn new(kind: CaptureKind, scheduled: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            scheduled,
            captured: BTreeSet::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn record(&mut self, sector: u32, success: bool) {
        if success {
            self.failed.remove(&sector);
            self.captured.insert(sector);
        } else {
            self.captured.remove(&sector);
            self.failed.insert(sector);
        }
    }

    /// Sectors of `expected` without a successful capture.
    pub fn missing(&self, expected: &[u32]) -> Vec<u32> {
        expected
            .iter()
            .copied()
            .filter(|sector| !self.captured.contains(sector))
            .collect()
    }
}

/// Latest control and current sessions per entry. Lives outside the job
/// list so schedule refreshes keep it.
#[derive(Debug, Default)]
pub struct SessionLedger {
    sessions: HashMap<(EntryId, CaptureKind), CaptureSession>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for a firing scheduled at `scheduled`, minting a fresh id when
    /// the stored one belongs to an earlier firing.
    pub fn session_for(
        &mut self,
        entry: &EntryId,
        kind: CaptureKind,
        scheduled: NaiveDateTime,
    ) -> &mut CaptureSession {
        let session = self
            .sessions
            .entry((entry.clone(), kind))
            .or_insert_with(|| CaptureSession::new(kind, scheduled));
        if session.scheduled != scheduled {
            *session = CaptureSession::new(kind, scheduled);
        }
        session
    }

    pub fn latest(&self, entry: &EntryId, kind: CaptureKind) -> Option<&CaptureSession> {
        self.sessions.get(&(entry.clone(), kind))
    }

    /// Drops the sessions of entries not in `live`. Returns how many went.
    pub fn retain_entries(&mut self, live: &HashSet<EntryId>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|(entry, _), _| live.contains(entry));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// What a detection job found in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<'a> {
    /// No control or no current session has ever been minted.
    NoSession { kind: CaptureKind },
    Ready {
        control: &'a CaptureSession,
        current: &'a CaptureSession,
        issues: Vec<String>,
    },
}

/// A session more than a day older than the reference instant, or newer
/// than it, does not belong to the shift being compared. A full 24 hour
/// shift still pairs with its own control.
fn is_stale(session: NaiveDateTime, reference: NaiveDateTime) -> bool {
    session > reference || reference - session > TimeDelta::days(1)
}

pub fn readiness<'a>(
    ledger: &'a SessionLedger,
    entry: &EntryId,
    sectors: &[u32],
    scheduled: NaiveDateTime,
) -> Readiness<'a> {
    let Some(control) = ledger.latest(entry, CaptureKind::Control) else {
        return Readiness::NoSession {
            kind: CaptureKind::Control,
        };
    };
    let Some(current) = ledger.latest(entry, CaptureKind::Current) else {
        return Readiness::NoSession {
            kind: CaptureKind::Current,
        };
    };

    let mut issues = Vec::new();
    if is_stale(current.scheduled, scheduled) {
        issues.push(format!(
            "current session {} is from {}, not this shift",
            current.id, current.scheduled
        ));
    }
    if is_stale(control.scheduled, current.scheduled) {
        issues.push(format!(
            "control session {} is from {}, not this shift",
            control.id, control.scheduled
        ));
    }
    for (session, label) in [(control, "control"), (current, "current")] {
        let missing = session.missing(sectors);
        if !missing.is_empty() {
            issues.push(format!("{label} images missing for sectors {missing:?}"));
        }
    }

    Readiness::Ready {
        control,
        current,
        issues,
    }
}
