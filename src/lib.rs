pub mod camera;
pub mod capture;
pub mod cli;
pub mod db;
pub mod detection;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod sources;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use camera::HttpCameraResolver;
use capture::FrameCapturer;
use db::Database;
use detection::HttpDetector;
use models::ImageLayout;
use scheduler::{PipelineExecutor, Scheduler};
use service::{Clock, ScheduleWorker, SchedulerController, SystemClock};
use settings::{ScheduleSourceConfig, Settings};
use sources::{retain_clients, JsonFileSource, ScheduleSource};

fn open_source(config: &ScheduleSourceConfig) -> Result<Arc<dyn ScheduleSource>> {
    let source: Arc<dyn ScheduleSource> = match config {
        ScheduleSourceConfig::Sqlite { path } => Arc::new(
            Database::new(path.clone())
                .with_context(|| format!("failed to open schedule store {}", path.display()))?,
        ),
        ScheduleSourceConfig::File { path } => Arc::new(JsonFileSource::new(path.clone())),
    };
    Ok(source)
}

/// Builds the capture pipeline from `settings` and runs the scheduler until
/// ctrl-c.
pub async fn run(settings: Settings) -> Result<()> {
    info!("TabSense capture service starting up...");

    let source = open_source(&settings.schedule_source)?;
    let mut entries = source
        .load_entries()
        .await
        .with_context(|| format!("failed to load schedule from {}", source.describe()))?;
    retain_clients(&mut entries, settings.clients.as_deref());
    if entries.is_empty() {
        warn!("No schedule entries found in {}", source.describe());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut scheduler = Scheduler::new(settings.detect_offset());
    scheduler.refresh(&entries, clock.now());

    let api = reqwest::Client::builder()
        .build()
        .context("failed to build API client")?;
    let executor = PipelineExecutor::new(
        Arc::new(HttpCameraResolver::new(api.clone(), settings.api_url.clone())),
        Arc::new(FrameCapturer::new(settings.capture_config())?),
        Arc::new(HttpDetector::new(api, settings.api_url.clone())),
        ImageLayout::new(settings.image_root.clone(), settings.naming),
        settings.render,
    )
    .require_complete_captures(settings.require_complete_captures);

    let worker = ScheduleWorker::new(scheduler, executor, source, clock)
        .with_clients(settings.clients.clone())
        .with_refresh_interval(settings.refresh_interval());

    let mut controller = SchedulerController::new();
    controller.start(worker, settings.poll_interval())?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested, waiting for the current tick to finish");
    controller.stop().await?;

    info!("TabSense capture service stopped");
    Ok(())
}
