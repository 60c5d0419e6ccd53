//! Single-frame capture from camera stream addresses.
//!
//! HTTP(S) snapshot URLs are fetched with reqwest. Every other address
//! (RTSP, a local device index, a device or file path) goes through an
//! ffmpeg child process. Either way the frame is resized to the configured
//! resolution and written as PNG.

pub mod ffmpeg;
pub mod normalize;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::Url;
use thiserror::Error;

use crate::models::CapturedImage;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open stream {address}: {reason}")]
    Open { address: String, reason: String },
    #[error("no frame read from {address}")]
    NoFrame { address: String },
    #[error("frame from {address} is not a decodable image: {source}")]
    Decode {
        address: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot from {address} is larger than {limit} bytes")]
    TooLarge { address: String, limit: usize },
    #[error("capture from {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error("capture worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAddress {
    Http(Url),
    /// Local camera index, read as `/dev/video{N}`.
    Device(u32),
    /// RTSP URL, device node or file path handed to ffmpeg as-is.
    Stream(String),
}

impl StreamAddress {
    pub fn parse(link: &str) -> Result<Self, CaptureError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(CaptureError::Open {
                address: String::new(),
                reason: "empty stream address".into(),
            });
        }

        let lower = link.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Url::parse(link)
                .map(StreamAddress::Http)
                .map_err(|err| CaptureError::Open {
                    address: link.to_string(),
                    reason: format!("invalid URL: {err}"),
                });
        }

        if link.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = link.parse() {
                return Ok(StreamAddress::Device(index));
            }
        }

        Ok(StreamAddress::Stream(link.to_string()))
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamAddress::Http(url) => write!(f, "{url}"),
            StreamAddress::Device(index) => write!(f, "device {index}"),
            StreamAddress::Stream(input) => f.write_str(input),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub http_timeout: Duration,
    pub stream_timeout: Duration,
    pub ffmpeg_path: PathBuf,
    /// Largest HTTP snapshot body read before giving up on the frame.
    pub max_snapshot_bytes: usize,
}

pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 32 * 1024 * 1024;

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_width: 1024,
            frame_height: 576,
            http_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(15),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Captures one frame from `link` into `output`.
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(&self, link: &str, output: &Path) -> Result<CapturedImage, CaptureError>;
}

pub struct FrameCapturer {
    config: CaptureConfig,
    http: reqwest::Client,
}

impl FrameCapturer {
    pub fn new(config: CaptureConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to build camera HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    async fn fetch_snapshot(&self, url: &Url) -> Result<Vec<u8>, CaptureError> {
        let to_capture_error = |err: reqwest::Error| {
            if err.is_timeout() {
                CaptureError::Timeout {
                    address: url.to_string(),
                    timeout: self.config.http_timeout,
                }
            } else {
                CaptureError::Open {
                    address: url.to_string(),
                    reason: err.to_string(),
                }
            }
        };

        let limit = self.config.max_snapshot_bytes;
        let too_large = || CaptureError::TooLarge {
            address: url.to_string(),
            limit,
        };

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(to_capture_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Open {
                address: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        if response
            .content_length()
            .is_some_and(|length| length > limit as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(to_capture_error)? {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Capturer for FrameCapturer {
    async fn capture(&self, link: &str, output: &Path) -> Result<CapturedImage, CaptureError> {
        let started = Instant::now();
        let address = StreamAddress::parse(link)?;

        let bytes = match &address {
            StreamAddress::Http(url) => self.fetch_snapshot(url).await?,
            other => {
                ffmpeg::grab_frame(&self.config.ffmpeg_path, other, self.config.stream_timeout)
                    .await?
            }
        };
        let fetch_ms = started.elapsed().as_millis();

        let label = address.to_string();
        let output = output.to_path_buf();
        let (width, height) = (self.config.frame_width, self.config.frame_height);
        let image = tokio::task::spawn_blocking(move || {
            normalize::write_frame(&label, &bytes, width, height, &output)
        })
        .await
        .map_err(|err| CaptureError::Worker(err.to_string()))??;

        debug!(
            "Captured {} ({} bytes) from {} in {}ms (fetch: {}ms)",
            image.path.display(),
            image.bytes,
            address,
            started.elapsed().as_millis(),
            fetch_ms
        );
        Ok(image)
    }
}
