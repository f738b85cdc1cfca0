pub mod algorithm;
pub mod capture;
pub mod commands;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod telemetry;

use std::path::PathBuf;

use config::AppConfig;
use error::AppError;

/// Command-line overrides, applied on top of the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub frame_source: Option<PathBuf>,
    pub detection_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub no_audio: bool,
    pub once: bool,
}

impl RunOptions {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(source) = &self.frame_source {
            config.frame_source = source.clone();
        }
        if let Some(url) = &self.detection_url {
            config.detection.base_url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if self.no_audio {
            config.audio = false;
        }
    }
}

pub fn run(options: RunOptions) -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::load(options.config_path.as_deref())?;
    options.apply(&mut config);

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(commands::auto_capture::run_headless(config, options.once))?;

    log::info!(
        "run: finished captures={} events={}",
        summary.captures.len(),
        summary.events_path.display()
    );
    Ok(())
}
