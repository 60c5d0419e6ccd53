//! Client for the external stain-detection API (`GET /detect`).

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{DetectionRequest, DetectionResult};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("detection API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed detection response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResult, DetectionError>;
}

pub struct HttpDetector {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDetector {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResult, DetectionError> {
        let response = self
            .http
            .get(format!("{}/detect", self.base_url))
            .query(&request.query_pairs())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(DetectionError::Status {
                status,
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        Ok(DetectionResult::from_json(&body)?)
    }
}
