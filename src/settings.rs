use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureConfig, DEFAULT_MAX_SNAPSHOT_BYTES};
use crate::models::{NamingScheme, RenderOptions};

pub const CONFIG_ENV: &str = "TABSENSE_CONFIG";
pub const DB_ENV: &str = "TABSENSE_DB";
pub const API_URL_ENV: &str = "TABSENSE_API_URL";

const DEFAULT_CONFIG_PATH: &str = "tabsense.json";
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSourceConfig {
    Sqlite { path: PathBuf },
    File { path: PathBuf },
}

impl Default for ScheduleSourceConfig {
    fn default() -> Self {
        ScheduleSourceConfig::Sqlite {
            path: PathBuf::from("tabsense.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub image_root: PathBuf,
    pub naming: NamingScheme,
    pub frame_width: u32,
    pub frame_height: u32,
    pub http_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub ffmpeg_path: PathBuf,
    pub max_snapshot_bytes: usize,
    pub poll_interval_ms: u64,
    /// `None` loads the schedule once at startup and never again.
    pub refresh_interval_secs: Option<u64>,
    pub detect_offset_secs: i64,
    pub clients: Option<Vec<String>>,
    pub schedule_source: ScheduleSourceConfig,
    pub render: RenderOptions,
    pub require_complete_captures: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            image_root: PathBuf::from("imagedata"),
            naming: NamingScheme::default(),
            frame_width: 1024,
            frame_height: 576,
            http_timeout_secs: 10,
            stream_timeout_secs: 15,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
            poll_interval_ms: 1000,
            refresh_interval_secs: Some(3600),
            detect_offset_secs: 5,
            clients: None,
            schedule_source: ScheduleSourceConfig::default(),
            render: RenderOptions::default(),
            require_complete_captures: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Rejects values the scheduler or capturer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0..SECONDS_PER_DAY).contains(&self.detect_offset_secs) {
            bail!(
                "detect_offset_secs must be between 0 and {}, got {}",
                SECONDS_PER_DAY - 1,
                self.detect_offset_secs
            );
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            bail!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width,
                self.frame_height
            );
        }
        if self.http_timeout_secs == 0 || self.stream_timeout_secs == 0 {
            bail!("capture timeouts must be at least one second");
        }
        if self.max_snapshot_bytes == 0 {
            bail!("max_snapshot_bytes must be positive");
        }
        if self.refresh_interval_secs == Some(0) {
            bail!("refresh_interval_secs must be positive, or null to disable refreshing");
        }
        if self.api_url.trim().is_empty() {
            bail!("api_url must not be empty");
        }
        Ok(())
    }

    /// Loads `config`, else the file named by `TABSENSE_CONFIG`, else
    /// `tabsense.json`, and applies the environment overrides.
    pub fn from_env(config: Option<&Path>) -> Result<Self> {
        let path = config
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut settings = Self::load(&path)?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(db) = non_empty(DB_ENV) {
            self.schedule_source = ScheduleSourceConfig::Sqlite {
                path: PathBuf::from(db),
            };
        }
        if let Some(url) = non_empty(API_URL_ENV) {
            self.api_url = url;
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            stream_timeout: Duration::from_secs(self.stream_timeout_secs),
            ffmpeg_path: self.ffmpeg_path.clone(),
            max_snapshot_bytes: self.max_snapshot_bytes,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }

    /// Clamped to the range `validate` accepts.
    pub fn detect_offset(&self) -> TimeDelta {
        TimeDelta::seconds(self.detect_offset_secs.clamp(0, SECONDS_PER_DAY - 1))
    }
}
