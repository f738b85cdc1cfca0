//! Eye-detection result schema, as returned by the detection service.

use serde::{Deserialize, Serialize};

/// Axis-aligned eye region in normalized frame coordinates (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn width(self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(self) -> f64 {
        self.y_max - self.y_min
    }

    /// True when every coordinate is finite, inside `[0, 1]`, and the box has positive area.
    pub fn is_valid(self) -> bool {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        coords
            .iter()
            .all(|value| value.is_finite() && (0.0..=1.0).contains(value))
            && self.x_min < self.x_max
            && self.y_min < self.y_max
    }
}

/// Outcome of one analysis call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub success: bool,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn detected(bbox: BoundingBox) -> Self {
        Self {
            success: true,
            bbox: Some(bbox),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            bbox: None,
            error: Some(error.into()),
        }
    }

    /// The box, if this result counts as a detection.
    ///
    /// A box attached to an unsuccessful result, or one that violates the coordinate
    /// invariants, is treated the same as no box at all.
    pub fn usable_box(&self) -> Option<BoundingBox> {
        if !self.success {
            return None;
        }
        self.bbox.filter(|bbox| bbox.is_valid())
    }
}
