use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::scheduler::JobExecutor;

use super::loop_worker::{scheduler_loop, ScheduleWorker};

/// Owns the running scheduler loop task.
pub struct SchedulerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SchedulerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start<E>(&mut self, worker: ScheduleWorker<E>, poll_interval: Duration) -> Result<()>
    where
        E: JobExecutor + 'static,
    {
        if self.handle.is_some() {
            bail!("scheduler already running");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        info!(
            "Starting scheduler loop with {} jobs (poll every {}ms)",
            worker.scheduler().len(),
            poll_interval.as_millis()
        );
        let handle = tokio::spawn(async move {
            scheduler_loop(worker, poll_interval, token_clone).await;
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for the in-flight tick to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("scheduler loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SchedulerController {
    fn default() -> Self {
        Self::new()
    }
}
