//! Detection service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::DetectionClient;
use crate::capture::frame::EncodedFrame;
use crate::error::DetectionError;
use crate::models::detection::DetectionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpDetectionConfig {
    pub base_url: String,
    pub endpoint: String,
    /// Client-side request timeout. `None` waits for the service to answer.
    pub timeout_ms: Option<u64>,
}

impl Default for HttpDetectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            endpoint: "/detect-eye".to_string(),
            timeout_ms: None,
        }
    }
}

impl HttpDetectionConfig {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

pub struct HttpDetectionClient {
    http: Client,
    config: HttpDetectionConfig,
}

impl HttpDetectionClient {
    pub fn new(config: HttpDetectionConfig) -> Result<Self, DetectionError> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpDetectionConfig {
        &self.config
    }

    /// Whether the service reports itself healthy. Transport errors count as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = self.config.url("/health");
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.status == "healthy" || health.status == "ok",
                    Err(err) => {
                        log::warn!("detection_client: unreadable health response: {err}");
                        false
                    }
                }
            }
            Ok(response) => {
                log::warn!("detection_client: health check failed: {}", response.status());
                false
            }
            Err(err) => {
                log::warn!("detection_client: health check error: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl DetectionClient for HttpDetectionClient {
    async fn detect(&self, frame: &EncodedFrame) -> Result<DetectionResult, DetectionError> {
        let url = self.config.url(&self.config.endpoint);
        let data_url = frame.to_data_url();

        log::debug!(
            "detection_client: POST {url} frame={}x{} bytes={}",
            frame.width,
            frame.height,
            frame.jpeg.len()
        );

        let response = self
            .http
            .post(&url)
            .json(&DetectRequest { image: &data_url })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectionError::RequestFailed(format!(
                "detection service returned {status}: {body}"
            )));
        }

        let raw = response.text().await?;
        serde_json::from_str::<DetectionResult>(&raw)
            .map_err(|err| DetectionError::InvalidResponse(err.to_string()))
    }
}
