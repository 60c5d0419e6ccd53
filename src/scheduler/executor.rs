use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::camera::CameraResolver;
use crate::capture::Capturer;
use crate::detection::Detector;
use crate::models::{
    CaptureKind, CapturedImage, DetectionRequest, EntryId, ImageLayout, RenderOptions,
    ScheduleEntry,
};

use super::job::JobAction;
use super::sessions::{readiness, Readiness, SessionLedger};
use super::JobExecutor;

/// Runs capture and detection jobs against the camera resolver, frame
/// capturer and detection API.
pub struct PipelineExecutor {
    resolver: Arc<dyn CameraResolver>,
    capturer: Arc<dyn Capturer>,
    detector: Arc<dyn Detector>,
    layout: ImageLayout,
    render: RenderOptions,
    require_complete_captures: bool,
    ledger: SessionLedger,
}

impl PipelineExecutor {
    pub fn new(
        resolver: Arc<dyn CameraResolver>,
        capturer: Arc<dyn Capturer>,
        detector: Arc<dyn Detector>,
        layout: ImageLayout,
        render: RenderOptions,
    ) -> Self {
        Self {
            resolver,
            capturer,
            detector,
            layout,
            render,
            require_complete_captures: false,
            ledger: SessionLedger::new(),
        }
    }

    /// Skip detection when any sector lacks a control or current image.
    pub fn require_complete_captures(mut self, required: bool) -> Self {
        self.require_complete_captures = required;
        self
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    async fn capture(
        &mut self,
        entry: &ScheduleEntry,
        sector: u32,
        kind: CaptureKind,
        scheduled: NaiveDateTime,
    ) -> Result<()> {
        let key = entry.entry_id();
        let session_id = self.ledger.session_for(&key, kind, scheduled).id.clone();
        let output = self.layout.path_for(kind, &entry.room, &session_id, sector);

        let result: Result<CapturedImage> = async {
            let camera = self
                .resolver
                .resolve(&entry.client, &entry.room, sector)
                .await
                .context("camera lookup failed")?;
            self.capturer
                .capture(&camera.link, &output)
                .await
                .with_context(|| format!("{kind} capture from {} failed", camera.link))
        }
        .await;

        self.ledger
            .session_for(&key, kind, scheduled)
            .record(sector, result.is_ok());

        let image = result.with_context(|| {
            format!("room {} sector {sector} session {session_id}", entry.room)
        })?;
        info!(
            "Captured {kind} image for room {}, sector {sector}: {}",
            entry.room,
            image.path.display()
        );
        Ok(())
    }

    async fn detect(&mut self, entry: &ScheduleEntry, scheduled: NaiveDateTime) -> Result<()> {
        let key = entry.entry_id();
        let naming = self.layout.naming();

        let request = match readiness(&self.ledger, &key, &entry.sectors, scheduled) {
            Readiness::NoSession { kind } => {
                warn!(
                    "Skipping detection for room {}: no {kind} capture has run for this entry yet",
                    entry.room
                );
                return Ok(());
            }
            Readiness::Ready {
                control,
                current,
                issues,
            } => {
                if !issues.is_empty() {
                    if self.require_complete_captures {
                        warn!(
                            "Skipping detection for room {}: {}",
                            entry.room,
                            issues.join("; ")
                        );
                        return Ok(());
                    }
                    warn!(
                        "Detection for room {} proceeding with incomplete captures: {}",
                        entry.room,
                        issues.join("; ")
                    );
                }
                DetectionRequest {
                    control: naming.session_stem(&entry.room, &control.id),
                    current: naming.session_stem(&entry.room, &current.id),
                    sectors: entry.sectors.clone(),
                    client: entry.client.clone(),
                    room: entry.room.clone(),
                    render: self.render,
                }
            }
        };

        let result = self
            .detector
            .detect(&request)
            .await
            .with_context(|| format!("detection for room {} failed", entry.room))?;

        if result.is_clean() {
            info!("No stains detected in room {}", entry.room);
        } else {
            let sectors: Vec<_> = result.stains.keys().collect();
            info!(
                "Detection for room {} found stains in {} sectors: {sectors:?}",
                entry.room,
                result.stains.len()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for PipelineExecutor {
    async fn execute(&mut self, action: &JobAction, scheduled: NaiveDateTime) -> Result<()> {
        match action {
            JobAction::Capture { entry, sector, kind } => {
                self.capture(entry, *sector, *kind, scheduled).await
            }
            JobAction::Detect { entry } => self.detect(entry, scheduled).await,
        }
    }

    fn retain_entries(&mut self, live: &HashSet<EntryId>) {
        let dropped = self.ledger.retain_entries(live);
        if dropped > 0 {
            debug!("Dropped {dropped} capture sessions of entries no longer scheduled");
        }
    }
}
