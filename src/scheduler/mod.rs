//! Daily time-of-day job scheduler.
//!
//! The scheduler owns the job list derived from schedule entries. Each poll
//! it runs the jobs whose next run has been reached, one after another, and
//! keeps every job's failure (error or panic) inside that job.

pub mod executor;
pub mod gate;
pub mod job;
pub mod plan;
pub mod sessions;

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use futures::FutureExt;
use log::{debug, error, info};

use crate::models::{DaySet, EntryId, ScheduleEntry};

pub use executor::PipelineExecutor;
pub use gate::is_active;
pub use job::{next_occurrence, Job, JobAction, JobId, JobKey, JobKind};
pub use plan::PlannedJob;
pub use sessions::{CaptureSession, SessionLedger};

/// Runs one job's payload. Errors end at the scheduler's per-job boundary.
#[async_trait]
pub trait JobExecutor: Send {
    async fn execute(
        &mut self,
        action: &JobAction,
        scheduled: NaiveDateTime,
    ) -> anyhow::Result<()>;

    /// Called after a schedule refresh with the entries that still have jobs.
    fn retain_entries(&mut self, _live: &HashSet<EntryId>) {}
}

/// What one `run_pending` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs whose payload ran, in execution order (failed ones included).
    pub executed: Vec<JobKey>,
    /// Jobs that were due but gated out for today.
    pub skipped: Vec<JobKey>,
    pub failed: Vec<JobKey>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.executed.is_empty() && self.skipped.is_empty()
    }
}

pub struct Scheduler {
    jobs: Vec<Job>,
    next_id: u64,
    detect_offset: TimeDelta,
}

impl Scheduler {
    pub fn new(detect_offset: TimeDelta) -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
            detect_offset,
        }
    }

    pub fn detect_offset(&self) -> TimeDelta {
        self.detect_offset
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Entries that currently have at least one job.
    pub fn entry_ids(&self) -> HashSet<EntryId> {
        self.jobs.iter().map(|job| job.key().entry).collect()
    }

    /// Earliest pending run across all jobs.
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().map(|job| job.next_run).min()
    }

    /// Adds a daily trigger. The first run is the next occurrence of
    /// `trigger` after `now`.
    pub fn register(
        &mut self,
        trigger: NaiveTime,
        days: DaySet,
        action: JobAction,
        now: NaiveDateTime,
    ) -> JobId {
        let planned = PlannedJob {
            trigger,
            days,
            lag_days: 0,
            action,
        };
        self.push_job(planned, next_occurrence(trigger, now))
    }

    fn push_job(&mut self, planned: PlannedJob, next_run: NaiveDateTime) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            trigger: planned.trigger,
            days: planned.days,
            lag_days: planned.lag_days,
            action: planned.action,
            next_run,
            last_run: None,
        });
        id
    }

    /// Replaces every job with those derived from `entries`. Jobs whose key
    /// and trigger survive keep their pending run, so a refresh in the same
    /// tick as a due job neither drops nor repeats it.
    pub fn refresh(&mut self, entries: &[ScheduleEntry], now: NaiveDateTime) -> usize {
        let carried: HashMap<JobKey, (NaiveTime, NaiveDateTime, Option<NaiveDateTime>)> = self
            .jobs
            .drain(..)
            .map(|job| (job.key(), (job.trigger, job.next_run, job.last_run)))
            .collect();

        for planned in plan::expand_entries(entries, self.detect_offset) {
            let key = planned.action.key();
            match carried.get(&key) {
                Some(&(trigger, next_run, last_run)) if trigger == planned.trigger => {
                    self.push_job(planned, next_run);
                    if let Some(job) = self.jobs.last_mut() {
                        job.last_run = last_run;
                    }
                }
                _ => {
                    let next_run = next_occurrence(planned.trigger, now);
                    self.push_job(planned, next_run);
                }
            }
        }

        info!(
            "Schedule refreshed: {} entries, {} jobs",
            entries.len(),
            self.jobs.len()
        );
        self.jobs.len()
    }

    /// Runs every job whose next run is at or before `now`, ordered by
    /// scheduled instant and then registration order. Each job fires at most
    /// once per call and is rescheduled to its next daily occurrence after
    /// `now`.
    pub async fn run_pending<E>(&mut self, now: NaiveDateTime, executor: &mut E) -> TickReport
    where
        E: JobExecutor + ?Sized,
    {
        let mut due: Vec<usize> = (0..self.jobs.len())
            .filter(|&index| self.jobs[index].is_due(now))
            .collect();
        due.sort_by_key(|&index| (self.jobs[index].next_run, self.jobs[index].id));

        let mut report = TickReport::default();
        for index in due {
            let job = &mut self.jobs[index];
            let scheduled = job.next_run;
            job.last_run = Some(now);
            job.next_run = next_occurrence(job.trigger, now);

            let job = &self.jobs[index];
            let key = job.key();
            let shift_day = job.shift_day(now);
            if !is_active(&job.days, shift_day) {
                debug!(
                    "Skipping {key}: no shift starting on {}",
                    shift_day.format("%A")
                );
                report.skipped.push(key);
                continue;
            }

            let outcome = AssertUnwindSafe(executor.execute(&job.action, scheduled))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("{} {key} failed: {err:#}", job.id);
                    report.failed.push(key.clone());
                }
                Err(panic) => {
                    error!("{} {key} panicked: {}", job.id, panic_message(panic.as_ref()));
                    report.failed.push(key.clone());
                }
            }
            report.executed.push(key);
        }

        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::parse_time_of_day;
    use anyhow::bail;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(JobKind, Option<u32>, NaiveDateTime)>,
        fail_sector: Option<u32>,
        panic_sector: Option<u32>,
    }

    #[async_trait]
    impl JobExecutor for Recorder {
        async fn execute(
            &mut self,
            action: &JobAction,
            scheduled: NaiveDateTime,
        ) -> anyhow::Result<()> {
            let key = action.key();
            self.calls.push((key.kind, key.sector, scheduled));
            if key.sector.is_some() && key.sector == self.panic_sector {
                panic!("camera driver blew up");
            }
            if key.sector.is_some() && key.sector == self.fail_sector {
                bail!("camera unreachable");
            }
            Ok(())
        }
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn monday_entry() -> ScheduleEntry {
        ScheduleEntry::new(
            "acme",
            "R1",
            "Lobby",
            vec![1, 2],
            parse_time_of_day("08:00").unwrap(),
            parse_time_of_day("17:00").unwrap(),
            DaySet::from_names(["Monday"]).unwrap(),
        )
    }

    fn overnight_entry() -> ScheduleEntry {
        ScheduleEntry::new(
            "acme",
            "R1",
            "Night",
            vec![1],
            parse_time_of_day("22:00").unwrap(),
            parse_time_of_day("06:00").unwrap(),
            DaySet::from_names(["Monday"]).unwrap(),
        )
    }

    fn scheduler_at(now: NaiveDateTime) -> Scheduler {
        let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
        scheduler.refresh(&[monday_entry()], now);
        scheduler
    }

    #[tokio::test]
    async fn due_job_runs_once_per_day() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        let mut recorder = Recorder::default();

        let first = scheduler.run_pending(at(1, 8, 0, 0), &mut recorder).await;
        let again = scheduler.run_pending(at(1, 8, 0, 30), &mut recorder).await;

        assert_eq!(first.executed.len(), 2);
        assert!(again.is_idle());
        assert_eq!(recorder.calls.len(), 2);
    }

    #[tokio::test]
    async fn registration_after_trigger_waits_for_tomorrow() {
        let mut scheduler = scheduler_at(at(1, 9, 0, 0));
        let mut recorder = Recorder::default();

        let report = scheduler.run_pending(at(1, 9, 0, 1), &mut recorder).await;
        assert!(report.is_idle());

        let control_runs: Vec<_> = scheduler
            .jobs()
            .iter()
            .filter(|job| job.action.kind() == JobKind::ControlCapture)
            .map(|job| job.next_run)
            .collect();
        assert_eq!(control_runs, vec![at(2, 8, 0, 0), at(2, 8, 0, 0)]);
    }

    #[tokio::test]
    async fn inactive_day_skips_every_job() {
        // 2024-01-02 was a Tuesday.
        let mut scheduler = scheduler_at(at(2, 7, 0, 0));
        let mut recorder = Recorder::default();

        for now in [at(2, 8, 0, 0), at(2, 17, 0, 0), at(2, 17, 0, 5)] {
            let report = scheduler.run_pending(now, &mut recorder).await;
            assert!(report.executed.is_empty());
        }
        assert!(recorder.calls.is_empty());
    }

    #[tokio::test]
    async fn failures_and_panics_stay_inside_their_job() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        let mut recorder = Recorder {
            fail_sector: Some(1),
            panic_sector: Some(2),
            ..Recorder::default()
        };

        let report = scheduler.run_pending(at(1, 17, 0, 5), &mut recorder).await;

        // Late tick: control, current and detection all come due together.
        assert_eq!(report.executed.len(), 5);
        assert_eq!(report.failed.len(), 4);
        let last = report.executed.last().unwrap();
        assert_eq!(last.kind, JobKind::Detect);
        assert!(!report.failed.contains(last));
    }

    #[tokio::test]
    async fn same_tick_jobs_run_in_trigger_then_registration_order() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        let mut recorder = Recorder::default();

        scheduler.run_pending(at(1, 17, 0, 10), &mut recorder).await;

        let order: Vec<_> = recorder.calls.iter().map(|(kind, sector, _)| (*kind, *sector)).collect();
        assert_eq!(
            order,
            vec![
                (JobKind::ControlCapture, Some(1)),
                (JobKind::ControlCapture, Some(2)),
                (JobKind::CurrentCapture, Some(1)),
                (JobKind::CurrentCapture, Some(2)),
                (JobKind::Detect, None),
            ]
        );
    }

    #[tokio::test]
    async fn refresh_keeps_pending_runs_of_surviving_jobs() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        let mut recorder = Recorder::default();

        // Refresh lands exactly on the trigger instant, before the tick runs.
        scheduler.refresh(&[monday_entry()], at(1, 8, 0, 0));
        let report = scheduler.run_pending(at(1, 8, 0, 0), &mut recorder).await;
        assert_eq!(report.executed.len(), 2);

        // Refresh after the run must not bring the job back today.
        scheduler.refresh(&[monday_entry()], at(1, 8, 0, 1));
        let report = scheduler.run_pending(at(1, 8, 0, 2), &mut recorder).await;
        assert!(report.is_idle());
    }

    #[tokio::test]
    async fn refresh_picks_up_changed_entries() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        let mut changed = monday_entry();
        changed.sectors = vec![1, 2, 3];

        let jobs = scheduler.refresh(&[changed], at(1, 7, 30, 0));
        assert_eq!(jobs, 7);

        let removed = scheduler.refresh(&[], at(1, 7, 31, 0));
        assert_eq!(removed, 0);
        assert_eq!(scheduler.next_due(), None);
    }

    #[tokio::test]
    async fn overnight_shift_ends_the_morning_after_its_start_day() {
        let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
        scheduler.refresh(&[overnight_entry()], at(1, 0, 0, 0));
        let mut recorder = Recorder::default();

        let mut ran = Vec::new();
        for now in [
            at(1, 6, 0, 0),
            at(1, 6, 0, 5),
            at(1, 22, 0, 0),
            at(2, 6, 0, 0),
            at(2, 6, 0, 5),
        ] {
            let report = scheduler.run_pending(now, &mut recorder).await;
            let kinds: Vec<_> = report.executed.iter().map(|key| key.kind).collect();
            ran.push(kinds);
        }

        // Monday morning belongs to Sunday night's shift, which is not scheduled.
        assert_eq!(
            ran,
            vec![
                vec![],
                vec![],
                vec![JobKind::ControlCapture],
                vec![JobKind::CurrentCapture],
                vec![JobKind::Detect],
            ]
        );
        assert_eq!(recorder.calls.last().unwrap().2, at(2, 6, 0, 5));

        // Tuesday night starts no shift, so Wednesday morning stays quiet.
        for now in [at(2, 22, 0, 0), at(3, 6, 0, 0), at(3, 6, 0, 5)] {
            let report = scheduler.run_pending(now, &mut recorder).await;
            assert!(report.executed.is_empty());
        }
    }

    #[tokio::test]
    async fn entry_ids_follow_the_job_list() {
        let mut scheduler = scheduler_at(at(1, 7, 0, 0));
        assert_eq!(
            scheduler.entry_ids(),
            HashSet::from([monday_entry().entry_id()])
        );
        scheduler.refresh(&[overnight_entry()], at(1, 7, 0, 0));
        assert_eq!(
            scheduler.entry_ids(),
            HashSet::from([overnight_entry().entry_id()])
        );
    }

    #[tokio::test]
    async fn registered_actions_fire_at_their_trigger() {
        let mut scheduler = Scheduler::new(TimeDelta::seconds(5));
        let entry = std::sync::Arc::new(monday_entry());
        let id = scheduler.register(
            parse_time_of_day("12:30").unwrap(),
            entry.days,
            JobAction::Detect { entry },
            at(1, 12, 0, 0),
        );
        assert_eq!(scheduler.jobs()[0].id, id);
        assert_eq!(scheduler.next_due(), Some(at(1, 12, 30, 0)));

        let mut recorder = Recorder::default();
        scheduler.run_pending(at(1, 12, 30, 0), &mut recorder).await;
        assert_eq!(recorder.calls, vec![(JobKind::Detect, None, at(1, 12, 30, 0))]);
        assert_eq!(scheduler.jobs()[0].last_run, Some(at(1, 12, 30, 0)));
        assert_eq!(scheduler.next_due(), Some(at(2, 12, 30, 0)));
    }
}
