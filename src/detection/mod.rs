//! Eye-detection service boundary.

pub mod http;

use async_trait::async_trait;

use crate::capture::frame::EncodedFrame;
use crate::error::DetectionError;
use crate::models::detection::DetectionResult;

pub use http::{HttpDetectionClient, HttpDetectionConfig};

/// One request/response exchange with the detection service. Implementations own any
/// transport concerns; callers never retry.
#[async_trait]
pub trait DetectionClient: Send + Sync {
    async fn detect(&self, frame: &EncodedFrame) -> Result<DetectionResult, DetectionError>;
}
