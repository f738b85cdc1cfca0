use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("camera feed is not ready")]
    NotReady,

    #[error("failed to read frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode or encode frame: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection request failed: {0}")]
    RequestFailed(String),

    #[error("invalid detection response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("audio output is not compiled in")]
    Unsupported,

    #[error("audio output config unavailable: {0}")]
    Config(String),

    #[error("unsupported sample format: {0}")]
    SampleFormat(String),

    #[error("failed to build audio stream: {0}")]
    Build(String),

    #[error("failed to start audio stream: {0}")]
    Play(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to resolve Pictures directory")]
    NoPicturesDir,

    #[error("storage io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
