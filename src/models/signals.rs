//! Read-only view of the auto-capture session for the UI.

use serde::{Deserialize, Serialize};

use crate::algorithm::tracking::TrackingState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCaptureSignals {
    pub enabled: bool,
    pub status: TrackingState,
    /// Preview zoom factor, always within the configured range.
    pub zoom: f64,
    /// Seconds left before capture; `None` when no countdown is running.
    pub countdown: Option<u8>,
}

impl Default for AutoCaptureSignals {
    fn default() -> Self {
        Self {
            enabled: false,
            status: TrackingState::Idle,
            zoom: 1.0,
            countdown: None,
        }
    }
}
