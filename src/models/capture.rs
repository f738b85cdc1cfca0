//! Схема метаданных снимка (capture.json).
//! schemaVersion: 1

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Root object of `capture.json`, stored next to `capture.jpg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub schema_version: u32,
    pub id: String,
    /// Unix timestamp (мс) of the capture.
    pub created_at: u64,
    /// Размер полного кадра.
    pub width: u32,
    pub height: u32,
    /// Preview zoom at the moment of capture.
    pub zoom: f64,
    /// Image file relative to the capture folder.
    pub image_path: String,
}
