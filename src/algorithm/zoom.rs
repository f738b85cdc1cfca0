use serde::{Deserialize, Serialize};

use crate::models::detection::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoomConfig {
    /// Desired on-screen width of the eye box, as a fraction of the frame width.
    pub target_box_width: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Fraction of the remaining distance covered per tick.
    pub smoothing: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            target_box_width: 0.40,
            min_zoom: 1.0,
            max_zoom: 4.0,
            smoothing: 0.2,
        }
    }
}

/// Exponentially smoothed preview zoom. The only memory is the current zoom value.
#[derive(Debug, Clone)]
pub struct ZoomEstimator {
    config: ZoomConfig,
    zoom: f64,
}

impl ZoomEstimator {
    pub fn new(config: ZoomConfig) -> Self {
        let zoom = config.min_zoom;
        Self { config, zoom }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn target_for(&self, detection: Option<&BoundingBox>) -> f64 {
        match detection {
            Some(bbox) => target_zoom_for_width(bbox.width(), &self.config),
            None => self.config.min_zoom,
        }
    }

    /// Moves one smoothing step toward the target implied by `detection`.
    pub fn update(&mut self, detection: Option<&BoundingBox>) -> f64 {
        let target = self.target_for(detection);
        let factor = self.config.smoothing.clamp(0.0, 1.0);
        let next = self.zoom + (target - self.zoom) * factor;
        self.zoom = clamp_zoom(next, &self.config);
        self.zoom
    }

    /// Snaps back to the minimum; used on disable, where no animation is needed.
    pub fn reset(&mut self) {
        self.zoom = self.config.min_zoom;
    }
}

pub fn target_zoom_for_width(box_width: f64, config: &ZoomConfig) -> f64 {
    if !box_width.is_finite() || box_width <= 0.0 {
        return clamp_zoom(config.max_zoom, config);
    }
    clamp_zoom(config.target_box_width / box_width, config)
}

fn clamp_zoom(zoom: f64, config: &ZoomConfig) -> f64 {
    let min = config.min_zoom.max(1.0);
    let max = config.max_zoom.max(min);
    if zoom.is_nan() {
        return min;
    }
    zoom.clamp(min, max)
}
