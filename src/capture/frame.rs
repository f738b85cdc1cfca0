//! Frame sampling from the live camera feed.
//!
//! Analysis frames are downscaled so their longer edge fits the detector's input size and
//! JPEG-encoded; capture frames keep full resolution.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::FrameError;

const CAPTURE_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisFrameSpec {
    pub max_edge_px: u32,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for AnalysisFrameSpec {
    fn default() -> Self {
        Self {
            max_edge_px: 640,
            jpeg_quality: 80,
        }
    }
}

/// Downscaled JPEG sent to the detection service.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Full-resolution JPEG handed to the capture callback.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Source of frames from the live feed.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Whether the feed currently has a frame to offer.
    fn is_ready(&self) -> bool;

    async fn analysis_frame(&self, spec: AnalysisFrameSpec) -> Result<EncodedFrame, FrameError>;

    async fn full_frame(&self) -> Result<CapturedFrame, FrameError>;
}

/// Dimensions of `width`×`height` scaled so the longer edge is at most `max_edge`.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longer = width.max(height);
    if width == 0 || height == 0 || max_edge == 0 || longer <= max_edge {
        return (width, height);
    }

    let scale = |side: u32| -> u32 {
        ((side as u64 * max_edge as u64 + longer as u64 / 2) / longer as u64)
            .clamp(1, max_edge as u64) as u32
    };
    (scale(width), scale(height))
}

pub fn encode_analysis_frame(
    image: &DynamicImage,
    spec: AnalysisFrameSpec,
) -> Result<EncodedFrame, FrameError> {
    let (width, height) = image.dimensions();
    let (out_width, out_height) = fit_within(width, height, spec.max_edge_px);

    let scaled: Cow<'_, DynamicImage> = if (out_width, out_height) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_exact(out_width, out_height, FilterType::Triangle))
    };

    let jpeg = encode_jpeg(&scaled, spec.jpeg_quality)?;
    Ok(EncodedFrame {
        jpeg,
        width: out_width,
        height: out_height,
    })
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
    Ok(jpeg)
}

/// Treats an image file that an external camera process keeps overwriting as the live feed.
#[derive(Debug, Clone)]
pub struct LatestFileSampler {
    path: PathBuf,
}

impl LatestFileSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameSampler for LatestFileSampler {
    fn is_ready(&self) -> bool {
        self.path.is_file()
    }

    async fn analysis_frame(&self, spec: AnalysisFrameSpec) -> Result<EncodedFrame, FrameError> {
        if !self.is_ready() {
            return Err(FrameError::NotReady);
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)?;
            let image = image::load_from_memory(&bytes)?;
            encode_analysis_frame(&image, spec)
        })
        .await
        .map_err(|err| FrameError::Worker(err.to_string()))?
    }

    async fn full_frame(&self) -> Result<CapturedFrame, FrameError> {
        if !self.is_ready() {
            return Err(FrameError::NotReady);
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)?;
            let image = image::load_from_memory(&bytes)?;
            let (width, height) = image.dimensions();
            let jpeg = match image::guess_format(&bytes) {
                Ok(ImageFormat::Jpeg) => bytes,
                _ => encode_jpeg(&image, CAPTURE_JPEG_QUALITY)?,
            };
            Ok(CapturedFrame {
                jpeg,
                width,
                height,
            })
        })
        .await
        .map_err(|err| FrameError::Worker(err.to_string()))?
    }
}
