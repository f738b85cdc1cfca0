//! Headless auto-capture session.
//!
//! Drives the orchestrator against the configured camera feed and detection service, saves
//! every capture, and reads `enable` / `disable` / `status` / `quit` lines from the control
//! input. The session trace is written next to the captures when the session ends.
//!
//! Control lines are read on a dedicated `iris-control-input` thread: a blocking stdin read
//! must never hold up runtime shutdown.

use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::capture::audio::{AudioFeedback, SilentTones, ToneOutput};
use crate::capture::frame::{CapturedFrame, FrameSampler, LatestFileSampler};
use crate::capture::orchestrator::{AutoCaptureOrchestrator, Collaborators};
use crate::capture::store::CaptureStore;
use crate::config::{AppConfig, AutoCaptureConfig};
use crate::detection::{DetectionClient, HttpDetectionClient};
use crate::error::AppError;
use crate::models::capture::CaptureRecord;
use crate::telemetry::logger::SessionTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Enable,
    Disable,
    Status,
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "enable" | "on" => Some(Self::Enable),
            "disable" | "off" => Some(Self::Disable),
            "status" => Some(Self::Status),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub captures: Vec<CaptureRecord>,
    pub events_path: PathBuf,
}

pub struct AutoCaptureSession {
    pub config: AutoCaptureConfig,
    pub sampler: Arc<dyn FrameSampler>,
    pub detector: Arc<dyn DetectionClient>,
    pub tones: Arc<dyn ToneOutput>,
    pub store: CaptureStore,
    /// Stop after the first capture.
    pub once: bool,
}

impl AutoCaptureSession {
    /// Builds the session from application settings: file-backed camera feed, HTTP detector,
    /// and the default audio device unless audio is off.
    pub async fn from_config(config: AppConfig, once: bool) -> Result<Self, AppError> {
        config.validate()?;

        let root = match config.output_dir.clone() {
            Some(dir) => dir,
            None => CaptureStore::default_root()?,
        };
        let detector = HttpDetectionClient::new(config.detection.clone())?;
        if !detector.health_check().await {
            log::warn!(
                "auto_capture: detection service at {} is not healthy, continuing",
                detector.config().base_url
            );
        }

        let tones: Arc<dyn ToneOutput> = if config.audio {
            Arc::new(AudioFeedback::new())
        } else {
            Arc::new(SilentTones)
        };

        log::info!(
            "auto_capture: frame_source={} output={}",
            config.frame_source.display(),
            root.display()
        );

        Ok(Self {
            config: config.auto_capture,
            sampler: Arc::new(LatestFileSampler::new(config.frame_source)),
            detector: Arc::new(detector),
            tones,
            store: CaptureStore::new(root),
            once,
        })
    }

    /// Runs until `quit`, `shutdown` resolves, or (with `once`) the first capture is saved.
    pub async fn run<S>(
        self,
        control: mpsc::UnboundedReceiver<String>,
        shutdown: S,
    ) -> Result<SessionSummary, AppError>
    where
        S: Future<Output = ()>,
    {
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<CapturedFrame>();
        let orchestrator = AutoCaptureOrchestrator::spawn(
            self.config.clone(),
            Collaborators {
                sampler: self.sampler,
                detector: self.detector,
                tones: self.tones,
                on_capture: Arc::new(move |frame| {
                    let _ = frame_tx.send(frame);
                }),
            },
        );
        let trace = SessionTrace::start(orchestrator.signals());
        orchestrator.enable().await;

        let mut lines = Some(control);
        let mut captures = Vec::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("auto_capture: shutdown requested");
                    break;
                }

                Some(frame) = frame_rx.recv() => {
                    let zoom = orchestrator.current().zoom;
                    match self.store.save(&frame, zoom) {
                        Ok(record) => {
                            trace.record_captured(&record.id);
                            captures.push(record);
                            if self.once {
                                break;
                            }
                        }
                        Err(err) => log::error!("auto_capture: failed to save capture: {err}"),
                    }
                }

                line = next_line(&mut lines) => match line {
                    Some(line) => match ControlCommand::parse(&line) {
                        Some(ControlCommand::Enable) => orchestrator.enable().await,
                        Some(ControlCommand::Disable) => orchestrator.disable().await,
                        Some(ControlCommand::Status) => print_status(&orchestrator),
                        Some(ControlCommand::Quit) => break,
                        None if line.trim().is_empty() => {}
                        None => log::warn!("auto_capture: unknown command {:?}", line.trim()),
                    },
                    None => {
                        log::debug!("auto_capture: control input closed");
                        lines = None;
                    }
                },
            }
        }

        orchestrator.dispose().await;
        let events = trace.stop().await;
        let events_path = self.store.save_events(&events)?;

        Ok(SessionSummary {
            captures,
            events_path,
        })
    }
}

/// Runs a session configured from `config`, controlled from stdin and stopped by Ctrl-C.
pub async fn run_headless(config: AppConfig, once: bool) -> Result<SessionSummary, AppError> {
    let session = AutoCaptureSession::from_config(config, once).await?;
    let control = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    session
        .run(control, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::warn!("auto_capture: failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Forwards lines from `reader` until it ends, fails, or the receiver is dropped. The thread is
/// detached; a read still blocked at exit dies with the process.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("iris-control-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        log::warn!("auto_capture: failed to read control input: {err}");
                        break;
                    }
                }
            }
        });

    if let Err(err) = spawned {
        log::warn!("auto_capture: control input unavailable: {err}");
    }
    rx
}

async fn next_line(lines: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match lines {
        Some(control) => control.recv().await,
        None => std::future::pending().await,
    }
}

fn print_status(orchestrator: &AutoCaptureOrchestrator) {
    let signals = orchestrator.current();
    match serde_json::to_string(&signals) {
        Ok(json) => println!("{json}"),
        Err(err) => log::warn!("auto_capture: failed to serialize status: {err}"),
    }
}
