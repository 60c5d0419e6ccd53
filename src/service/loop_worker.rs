use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::scheduler::{JobExecutor, Scheduler, TickReport};
use crate::sources::{retain_clients, ScheduleSource};

use super::clock::Clock;

/// Everything one scheduler loop owns: the job list, the executor that runs
/// jobs, and the source the job list is periodically rebuilt from.
pub struct ScheduleWorker<E> {
    scheduler: Scheduler,
    executor: E,
    source: Arc<dyn ScheduleSource>,
    clock: Arc<dyn Clock>,
    clients: Option<Vec<String>>,
    refresh_interval: Option<Duration>,
    last_refresh: Instant,
}

impl<E: JobExecutor> ScheduleWorker<E> {
    /// `scheduler` is expected to already hold the initial schedule.
    pub fn new(
        scheduler: Scheduler,
        executor: E,
        source: Arc<dyn ScheduleSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduler,
            executor,
            source,
            clock,
            clients: None,
            refresh_interval: None,
            last_refresh: Instant::now(),
        }
    }

    pub fn with_clients(mut self, clients: Option<Vec<String>>) -> Self {
        self.clients = clients;
        self
    }

    /// `None` keeps the startup schedule for the life of the process.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn refresh_due(&self) -> bool {
        self.refresh_interval
            .is_some_and(|interval| self.last_refresh.elapsed() >= interval)
    }

    /// Reloads the schedule. On failure the current jobs stay in place.
    pub async fn refresh(&mut self) -> bool {
        self.last_refresh = Instant::now();
        match self.source.load_entries().await {
            Ok(mut entries) => {
                retain_clients(&mut entries, self.clients.as_deref());
                let now = self.clock.now();
                self.scheduler.refresh(&entries, now);
                self.executor.retain_entries(&self.scheduler.entry_ids());
                true
            }
            Err(err) => {
                warn!(
                    "Schedule refresh from {} failed, keeping {} existing jobs: {err:#}",
                    self.source.describe(),
                    self.scheduler.len()
                );
                false
            }
        }
    }

    /// One poll: refresh when due, then run whatever jobs are due.
    pub async fn tick(&mut self) -> TickReport {
        if self.refresh_due() {
            self.refresh().await;
        }

        let now = self.clock.now();
        let report = self.scheduler.run_pending(now, &mut self.executor).await;
        if !report.is_idle() {
            debug!(
                "Tick at {now}: {} executed, {} failed, {} skipped",
                report.executed.len(),
                report.failed.len(),
                report.skipped.len()
            );
        }
        report
    }
}

pub async fn scheduler_loop<E: JobExecutor>(
    mut worker: ScheduleWorker<E>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> ScheduleWorker<E> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                worker.tick().await;
            }
            _ = cancel_token.cancelled() => {
                info!("scheduler loop shutting down");
                break;
            }
        }
    }

    worker
}
