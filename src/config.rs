//! Tuning constants and application settings.
//!
//! Settings come from `config.json` (every field optional), then environment overrides, then
//! CLI flags applied by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algorithm::countdown::CountdownConfig;
use crate::algorithm::zoom::ZoomConfig;
use crate::capture::audio::Tone;
use crate::capture::frame::AnalysisFrameSpec;
use crate::detection::HttpDetectionConfig;
use crate::error::ConfigError;

pub const ENV_DETECTION_URL: &str = "IRISCAPTURE_DETECTION_URL";
pub const ENV_FRAME_SOURCE: &str = "IRISCAPTURE_FRAME_SOURCE";
pub const ENV_OUTPUT_DIR: &str = "IRISCAPTURE_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoCaptureConfig {
    pub sample_period_ms: u64,
    pub steadiness_ms: u64,
    pub countdown_seconds: u8,
    pub countdown_step_ms: u64,
    pub analysis_max_edge_px: u32,
    pub analysis_jpeg_quality: u8,
    pub zoom: ZoomConfig,
    pub tick_tone: Tone,
    pub capture_tone: Tone,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 750,
            steadiness_ms: 500,
            countdown_seconds: 2,
            countdown_step_ms: 1_000,
            analysis_max_edge_px: 640,
            analysis_jpeg_quality: 80,
            zoom: ZoomConfig::default(),
            tick_tone: Tone::new(440.0, 100),
            capture_tone: Tone::new(880.0, 200),
        }
    }
}

impl AutoCaptureConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn steadiness(&self) -> Duration {
        Duration::from_millis(self.steadiness_ms)
    }

    pub fn countdown(&self) -> CountdownConfig {
        CountdownConfig {
            seconds: self.countdown_seconds,
            step: Duration::from_millis(self.countdown_step_ms),
        }
    }

    pub fn analysis_frame(&self) -> AnalysisFrameSpec {
        AnalysisFrameSpec {
            max_edge_px: self.analysis_max_edge_px,
            jpeg_quality: self.analysis_jpeg_quality,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_ms == 0 {
            return invalid("samplePeriodMs must be positive");
        }
        if self.steadiness_ms == 0 {
            return invalid("steadinessMs must be positive");
        }
        if self.countdown_seconds == 0 {
            return invalid("countdownSeconds must be at least 1");
        }
        if self.countdown_step_ms == 0 {
            return invalid("countdownStepMs must be positive");
        }
        if self.analysis_max_edge_px == 0 {
            return invalid("analysisMaxEdgePx must be positive");
        }
        if !(1..=100).contains(&self.analysis_jpeg_quality) {
            return invalid("analysisJpegQuality must be within 1..=100");
        }

        let zoom = &self.zoom;
        if !(zoom.smoothing > 0.0 && zoom.smoothing <= 1.0) {
            return invalid("zoom.smoothing must be within (0, 1]");
        }
        if !(zoom.min_zoom >= 1.0 && zoom.min_zoom <= zoom.max_zoom) {
            return invalid("zoom range must satisfy 1 <= minZoom <= maxZoom");
        }
        if !(zoom.target_box_width > 0.0 && zoom.target_box_width <= 1.0) {
            return invalid("zoom.targetBoxWidth must be within (0, 1]");
        }

        for (name, tone) in [("tickTone", self.tick_tone), ("captureTone", self.capture_tone)] {
            if tone.frequency_hz.is_nan() || tone.frequency_hz <= 0.0 || tone.duration_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} needs a positive frequency and duration"
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub auto_capture: AutoCaptureConfig,
    pub detection: HttpDetectionConfig,
    /// Image file the camera process keeps overwriting with its latest frame.
    pub frame_source: PathBuf,
    /// Where captures and session traces are written; defaults to `{Pictures}/IrisCapture`.
    pub output_dir: Option<PathBuf>,
    pub audio: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_capture: AutoCaptureConfig::default(),
            detection: HttpDetectionConfig::default(),
            frame_source: PathBuf::from("latest.jpg"),
            output_dir: None,
            audio: true,
        }
    }
}

impl AppConfig {
    /// `{config_dir}/IrisCapture/config.json`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("IrisCapture").join("config.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path`, or the default location when it exists, or built-in defaults; then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => {
                    log::info!("config: loading {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = get(ENV_DETECTION_URL) {
            self.detection.base_url = url;
        }
        if let Some(source) = get(ENV_FRAME_SOURCE) {
            self.frame_source = PathBuf::from(source);
        }
        if let Some(dir) = get(ENV_OUTPUT_DIR) {
            self.output_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auto_capture.validate()?;
        if self.detection.base_url.trim().is_empty() {
            return invalid("detection.baseUrl must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_timing() {
        let config = AutoCaptureConfig::default();
        assert_eq!(config.sample_period(), Duration::from_millis(750));
        assert_eq!(config.steadiness(), Duration::from_millis(500));
        assert_eq!(config.countdown().seconds, 2);
        assert_eq!(config.countdown().step, Duration::from_millis(1_000));
        assert_eq!(config.analysis_frame(), AnalysisFrameSpec::default());
        assert_eq!(config.tick_tone, Tone::new(440.0, 100));
        assert_eq!(config.capture_tone, Tone::new(880.0, 200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "autoCapture": { "steadinessMs": 800, "zoom": { "maxZoom": 3.0 } },
                "detection": { "baseUrl": "https://vision.example" }
            }"#,
        )
        .expect("parse config");

        assert_eq!(config.auto_capture.steadiness_ms, 800);
        assert_eq!(config.auto_capture.sample_period_ms, 750);
        assert_eq!(config.auto_capture.zoom.max_zoom, 3.0);
        assert_eq!(config.auto_capture.zoom.smoothing, 0.2);
        assert_eq!(config.detection.base_url, "https://vision.example");
        assert_eq!(config.detection.endpoint, "/detect-eye");
        assert!(config.audio);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases: Vec<Box<dyn Fn(&mut AutoCaptureConfig)>> = vec![
            Box::new(|c| c.sample_period_ms = 0),
            Box::new(|c| c.steadiness_ms = 0),
            Box::new(|c| c.countdown_step_ms = 0),
            Box::new(|c| c.capture_tone.frequency_hz = f32::NAN),
            Box::new(|c| c.capture_tone.frequency_hz = -440.0),
            Box::new(|c| c.countdown_seconds = 0),
            Box::new(|c| c.analysis_jpeg_quality = 0),
            Box::new(|c| c.analysis_jpeg_quality = 101),
            Box::new(|c| c.zoom.smoothing = 0.0),
            Box::new(|c| c.zoom.smoothing = 1.5),
            Box::new(|c| c.zoom.min_zoom = 0.5),
            Box::new(|c| c.zoom.max_zoom = 0.9),
            Box::new(|c| c.zoom.target_box_width = 0.0),
            Box::new(|c| c.tick_tone.duration_ms = 0),
        ];
        for mutate in cases {
            let mut config = AutoCaptureConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn environment_overrides_take_precedence() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            ENV_DETECTION_URL => Some("http://10.0.0.2:9000".to_string()),
            ENV_OUTPUT_DIR => Some("/tmp/iris".to_string()),
            ENV_FRAME_SOURCE => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.detection.base_url, "http://10.0.0.2:9000");
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/iris")));
        assert_eq!(config.frame_source, PathBuf::from("latest.jpg"));
    }

    #[test]
    fn reports_unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            AppConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").expect("write");
        assert!(matches!(
            AppConfig::from_file(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
