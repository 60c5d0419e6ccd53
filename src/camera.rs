//! Client for the dashboard API's camera lookup (`GET /cam`).

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::CameraLink;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("camera lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("camera lookup for {client}/{room} sector {sector} returned {status}")]
    Status {
        client: String,
        room: String,
        sector: u32,
        status: StatusCode,
    },
    #[error("no camera registered for {client}/{room} sector {sector}")]
    NotFound {
        client: String,
        room: String,
        sector: u32,
    },
}

#[async_trait]
pub trait CameraResolver: Send + Sync {
    async fn resolve(&self, client: &str, room: &str, sector: u32) -> Result<CameraLink, ResolveError>;
}

pub struct HttpCameraResolver {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCameraResolver {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CameraResolver for HttpCameraResolver {
    async fn resolve(&self, client: &str, room: &str, sector: u32) -> Result<CameraLink, ResolveError> {
        let sector_param = sector.to_string();
        let response = self
            .http
            .get(format!("{}/cam", self.base_url))
            .query(&[("client", client), ("room", room), ("sector", sector_param.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<CameraLink>().await?),
            StatusCode::NOT_FOUND => Err(ResolveError::NotFound {
                client: client.to_string(),
                room: room.to_string(),
                sector,
            }),
            status => Err(ResolveError::Status {
                client: client.to_string(),
                room: room.to_string(),
                sector,
                status,
            }),
        }
    }
}
