//! Auto-capture coordinator.
//!
//! One tokio task owns the `AnalysisSession` and services, in priority order: control commands,
//! the outstanding detection call, session deadlines (steadiness, countdown) and the sampling
//! tick. Because commands are polled first, a `disable()` is applied before any timer that
//! became due in the same instant, and its acknowledgement is sent only after every deadline
//! has been dropped.

use std::future::pending;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::capture::audio::ToneOutput;
use crate::capture::frame::{AnalysisFrameSpec, CapturedFrame, FrameSampler};
use crate::capture::state::{AnalysisSession, SessionEffect};
use crate::config::AutoCaptureConfig;
use crate::detection::DetectionClient;
use crate::models::detection::DetectionResult;
use crate::models::signals::AutoCaptureSignals;

/// Receives the full-resolution frame when a countdown completes. Fire-and-forget.
pub type CaptureCallback = Arc<dyn Fn(CapturedFrame) + Send + Sync>;

/// External collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub sampler: Arc<dyn FrameSampler>,
    pub detector: Arc<dyn DetectionClient>,
    pub tones: Arc<dyn ToneOutput>,
    pub on_capture: CaptureCallback,
}

enum Command {
    Enable(oneshot::Sender<()>),
    Disable(oneshot::Sender<()>),
    Shutdown,
}

pub struct AutoCaptureOrchestrator {
    commands: mpsc::UnboundedSender<Command>,
    signals: watch::Receiver<AutoCaptureSignals>,
    worker: Option<JoinHandle<()>>,
}

impl AutoCaptureOrchestrator {
    /// Starts the coordinator task on the current tokio runtime. The feature starts disabled.
    #[must_use]
    pub fn spawn(config: AutoCaptureConfig, collaborators: Collaborators) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals) = watch::channel(AutoCaptureSignals {
            zoom: config.zoom.min_zoom,
            ..AutoCaptureSignals::default()
        });

        let worker = Worker {
            session: AnalysisSession::new(config),
            collaborators,
            signals: signals_tx,
        };
        let handle = tokio::spawn(worker.run(command_rx));

        Self {
            commands,
            signals,
            worker: Some(handle),
        }
    }

    /// Enables auto-capture; returns once the session has been reset to `idle` with zoom 1.
    pub async fn enable(&self) {
        self.request(Command::Enable, "enable").await;
    }

    /// Disables auto-capture; returns once every timer is cancelled and the session is idle.
    pub async fn disable(&self) {
        self.request(Command::Disable, "disable").await;
    }

    async fn request(&self, command: fn(oneshot::Sender<()>) -> Command, name: &str) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(command(ack_tx)).is_err() || ack_rx.await.is_err() {
            log::warn!("auto_capture: {name} ignored, coordinator stopped");
        }
    }

    /// Live UI signals. Consumers only read them.
    pub fn signals(&self) -> watch::Receiver<AutoCaptureSignals> {
        self.signals.clone()
    }

    pub fn current(&self) -> AutoCaptureSignals {
        *self.signals.borrow()
    }

    /// Cancels everything and waits for the coordinator task to finish.
    pub async fn dispose(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                log::warn!("auto_capture: coordinator task failed: {err}");
            }
        }
    }
}

impl Drop for AutoCaptureOrchestrator {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

// ─── Coordinator task ────────────────────────────────────────────────────────

type PendingDetection = BoxFuture<'static, DetectionResult>;

struct Worker {
    session: AnalysisSession,
    collaborators: Collaborators,
    signals: watch::Sender<AutoCaptureSignals>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut ticker: Option<Interval> = None;
        let mut detection: Option<PendingDetection> = None;

        loop {
            let deadline = self.session.next_deadline();

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Enable(ack)) => {
                        if !self.session.is_enabled() {
                            detection = None;
                            self.session.enable();
                            ticker = Some(sampling_ticker(&self.session));
                            self.publish();
                        }
                        let _ = ack.send(());
                    }
                    Some(Command::Disable(ack)) => {
                        ticker = None;
                        detection = None;
                        self.session.disable();
                        self.publish();
                        let _ = ack.send(());
                    }
                    Some(Command::Shutdown) | None => {
                        self.session.disable();
                        self.publish();
                        break;
                    }
                },

                result = next_detection(&mut detection) => {
                    detection = None;
                    let effects = self.session.complete_sample(Instant::now(), &result);
                    self.perform(effects);
                    self.publish();
                }

                _ = sleep_until_deadline(deadline) => {
                    let effects = self.session.fire_due_timers(Instant::now());
                    self.perform(effects);
                    self.publish();
                }

                _ = next_tick(&mut ticker) => {
                    self.sample(&mut detection);
                }
            }
        }

        log::info!("auto_capture: coordinator stopped");
    }

    fn sample(&mut self, detection: &mut Option<PendingDetection>) {
        let camera_ready = self.collaborators.sampler.is_ready();
        if detection.is_some() || !self.session.try_begin_sample(camera_ready) {
            log::debug!(
                "auto_capture: tick dropped in_flight={} camera_ready={camera_ready}",
                self.session.is_in_flight()
            );
            return;
        }

        let sampler = Arc::clone(&self.collaborators.sampler);
        let detector = Arc::clone(&self.collaborators.detector);
        let spec = self.session.config().analysis_frame();
        *detection = Some(Box::pin(async move {
            AssertUnwindSafe(analyze_frame(sampler.as_ref(), detector.as_ref(), spec))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    log::warn!("auto_capture: detection panicked");
                    DetectionResult::failure("detection panicked")
                })
        }));
    }

    fn perform(&self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Beep(tone) => self.collaborators.tones.beep(tone),
                SessionEffect::Capture => self.trigger_capture(),
            }
        }
    }

    fn trigger_capture(&self) {
        let sampler = Arc::clone(&self.collaborators.sampler);
        let on_capture = Arc::clone(&self.collaborators.on_capture);
        tokio::spawn(async move {
            match sampler.full_frame().await {
                Ok(frame) => {
                    log::info!("auto_capture: captured {}x{}", frame.width, frame.height);
                    on_capture(frame);
                }
                Err(err) => log::warn!("auto_capture: capture frame unavailable: {err}"),
            }
        });
    }

    fn publish(&self) {
        let next = self.session.signals();
        self.signals.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// One sampling step. Every failure is reported as "no detection".
async fn analyze_frame(
    sampler: &dyn FrameSampler,
    detector: &dyn DetectionClient,
    spec: AnalysisFrameSpec,
) -> DetectionResult {
    let frame = match sampler.analysis_frame(spec).await {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("auto_capture: analysis frame unavailable: {err}");
            return DetectionResult::failure(err.to_string());
        }
    };

    match detector.detect(&frame).await {
        Ok(result) => result,
        Err(err) => {
            log::warn!("auto_capture: detection failed: {err}");
            DetectionResult::failure(err.to_string())
        }
    }
}

fn sampling_ticker(session: &AnalysisSession) -> Interval {
    let mut ticker = interval_at(Instant::now(), session.config().sample_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_detection(slot: &mut Option<PendingDetection>) -> DetectionResult {
    match slot {
        Some(pending_detection) => pending_detection.await,
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::algorithm::tracking::TrackingState;
    use crate::capture::audio::Tone;
    use crate::capture::frame::EncodedFrame;
    use crate::error::{DetectionError, FrameError};
    use crate::models::detection::BoundingBox;

    struct FakeSampler {
        ready: AtomicBool,
    }

    #[async_trait]
    impl FrameSampler for FakeSampler {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn analysis_frame(&self, spec: AnalysisFrameSpec) -> Result<EncodedFrame, FrameError> {
            Ok(EncodedFrame {
                jpeg: vec![0xFF, 0xD8],
                width: spec.max_edge_px,
                height: spec.max_edge_px * 3 / 4,
            })
        }

        async fn full_frame(&self) -> Result<CapturedFrame, FrameError> {
            Ok(CapturedFrame {
                jpeg: vec![0xFF, 0xD8],
                width: 1_920,
                height: 1_440,
            })
        }
    }

    /// Answers from a script, then with `fallback`. Each entry is (latency, result).
    struct ScriptedDetector {
        script: Mutex<VecDeque<(Duration, Option<DetectionResult>)>>,
        fallback: (Duration, DetectionResult),
        calls: AtomicUsize,
    }

    impl ScriptedDetector {
        fn always(latency: Duration, result: DetectionResult) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: (latency, result),
                calls: AtomicUsize::new(0),
            }
        }

        fn scripted(script: Vec<(Duration, Option<DetectionResult>)>, fallback: DetectionResult) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: (Duration::ZERO, fallback),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DetectionClient for ScriptedDetector {
        async fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionResult, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().expect("script lock").pop_front();
            let (latency, result) = match next {
                Some((latency, result)) => (latency, result),
                None => (self.fallback.0, Some(self.fallback.1.clone())),
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result.ok_or_else(|| DetectionError::RequestFailed("service down".to_string()))
        }
    }

    #[derive(Default)]
    struct PanickingDetector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DetectionClient for PanickingDetector {
        async fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionResult, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("detector exploded");
        }
    }

    #[derive(Default)]
    struct RecordingTones {
        beeps: Mutex<Vec<(Instant, Tone)>>,
    }

    impl ToneOutput for RecordingTones {
        fn beep(&self, tone: Tone) {
            self.beeps
                .lock()
                .expect("beeps lock")
                .push((Instant::now(), tone));
        }
    }

    struct Harness {
        orchestrator: AutoCaptureOrchestrator,
        sampler: Arc<FakeSampler>,
        detector: Arc<ScriptedDetector>,
        tones: Arc<RecordingTones>,
        captures: Arc<Mutex<Vec<Instant>>>,
    }

    impl Harness {
        fn new(detector: ScriptedDetector) -> Self {
            let sampler = Arc::new(FakeSampler {
                ready: AtomicBool::new(true),
            });
            let detector = Arc::new(detector);
            let tones = Arc::new(RecordingTones::default());
            let captures = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&captures);

            let orchestrator = AutoCaptureOrchestrator::spawn(
                AutoCaptureConfig::default(),
                Collaborators {
                    sampler: sampler.clone(),
                    detector: detector.clone(),
                    tones: tones.clone(),
                    on_capture: Arc::new(move |_frame: CapturedFrame| {
                        sink.lock().expect("captures lock").push(Instant::now());
                    }),
                },
            );

            Self {
                orchestrator,
                sampler,
                detector,
                tones,
                captures,
            }
        }

        fn capture_offsets(&self, t0: Instant) -> Vec<Duration> {
            self.captures
                .lock()
                .expect("captures lock")
                .iter()
                .map(|at| at.duration_since(t0))
                .collect()
        }

        fn beep_offsets(&self, t0: Instant) -> Vec<(Duration, f32)> {
            self.tones
                .beeps
                .lock()
                .expect("beeps lock")
                .iter()
                .map(|(at, tone)| (at.duration_since(t0), tone.frequency_hz))
                .collect()
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn hit() -> DetectionResult {
        DetectionResult::detected(BoundingBox {
            x_min: 0.30,
            y_min: 0.35,
            x_max: 0.50,
            y_max: 0.55,
        })
    }

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + ms(10),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn steady_eye_is_captured_two_seconds_after_lock() {
        let harness = Harness::new(ScriptedDetector::always(Duration::ZERO, hit()));
        let t0 = Instant::now();
        harness.orchestrator.enable().await;

        sleep_until(t0 + ms(600)).await;
        let signals = harness.orchestrator.current();
        assert_eq!(signals.status, TrackingState::Locked);
        assert_eq!(signals.countdown, Some(2));
        assert!(signals.zoom > 1.0 && signals.zoom <= 4.0);

        sleep_until(t0 + ms(1_600)).await;
        assert_eq!(harness.orchestrator.current().countdown, Some(1));

        sleep_until(t0 + ms(4_000)).await;
        let captures = harness.capture_offsets(t0);
        assert_eq!(captures.len(), 1, "one capture per lock episode");
        assert_near(captures[0], ms(2_500));
        assert_eq!(harness.orchestrator.current().countdown, None);

        let beeps = harness.beep_offsets(t0);
        assert_eq!(beeps.len(), 3);
        assert_near(beeps[0].0, ms(500));
        assert_eq!(beeps[0].1, 440.0);
        assert_near(beeps[1].0, ms(1_500));
        assert_eq!(beeps[1].1, 440.0);
        assert_near(beeps[2].0, ms(2_500));
        assert_eq!(beeps[2].1, 880.0);

        harness.orchestrator.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_detection_inside_countdown_cancels_capture() {
        let detector = ScriptedDetector::scripted(
            vec![
                (Duration::ZERO, Some(hit())),
                (Duration::ZERO, Some(hit())),
                (ms(200), None),
            ],
            DetectionResult::failure("no eye"),
        );
        let harness = Harness::new(detector);
        let t0 = Instant::now();
        harness.orchestrator.enable().await;

        sleep_until(t0 + ms(1_650)).await;
        assert_eq!(harness.orchestrator.current().status, TrackingState::Locked);
        assert_eq!(harness.orchestrator.current().countdown, Some(1));

        sleep_until(t0 + ms(1_750)).await;
        let signals = harness.orchestrator.current();
        assert_eq!(signals.status, TrackingState::Idle);
        assert_eq!(signals.countdown, None);

        sleep_until(t0 + ms(5_000)).await;
        assert!(harness.capture_offsets(t0).is_empty());
        assert_eq!(harness.beep_offsets(t0).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_mid_countdown_prevents_capture() {
        for k in [0u64, 400, 1_000, 1_999] {
            let harness = Harness::new(ScriptedDetector::always(Duration::ZERO, hit()));
            let t0 = Instant::now();
            harness.orchestrator.enable().await;

            sleep_until(t0 + ms(500 + k)).await;
            harness.orchestrator.disable().await;

            let signals = harness.orchestrator.current();
            assert!(!signals.enabled);
            assert_eq!(signals.countdown, None, "k={k}");
            assert_eq!(signals.status, TrackingState::Idle);
            assert_eq!(signals.zoom, 1.0);

            let calls = harness.detector.calls.load(Ordering::SeqCst);
            sleep_until(t0 + ms(5_000)).await;
            assert!(harness.capture_offsets(t0).is_empty(), "k={k}");
            assert_eq!(harness.detector.calls.load(Ordering::SeqCst), calls);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detection_drops_overlapping_ticks() {
        let harness = Harness::new(ScriptedDetector::always(ms(2_000), hit()));
        let t0 = Instant::now();
        harness.orchestrator.enable().await;

        sleep_until(t0 + ms(1_900)).await;
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 1);

        sleep_until(t0 + ms(3_000)).await;
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn camera_not_ready_skips_sampling() {
        let harness = Harness::new(ScriptedDetector::always(Duration::ZERO, hit()));
        harness.sampler.ready.store(false, Ordering::SeqCst);
        let t0 = Instant::now();
        harness.orchestrator.enable().await;

        sleep_until(t0 + ms(2_000)).await;
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.orchestrator.current().status, TrackingState::Idle);

        harness.sampler.ready.store(true, Ordering::SeqCst);
        sleep_until(t0 + ms(2_300)).await;
        assert_eq!(harness.detector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.orchestrator.current().status, TrackingState::Tracking);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_count_as_no_detection() {
        let detector = ScriptedDetector::scripted(
            vec![(Duration::ZERO, Some(hit())), (Duration::ZERO, None)],
            hit(),
        );
        let harness = Harness::new(detector);
        let mut signals = harness.orchestrator.signals();
        let t0 = Instant::now();
        harness.orchestrator.enable().await;

        sleep_until(t0 + ms(800)).await;
        assert_eq!(harness.orchestrator.current().status, TrackingState::Idle);
        assert!(signals.has_changed().unwrap_or(false));
        signals.borrow_and_update();

        sleep_until(t0 + ms(1_600)).await;
        assert_eq!(harness.orchestrator.current().status, TrackingState::Tracking);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_sampling() {
        let harness = Harness::new(ScriptedDetector::always(Duration::ZERO, hit()));
        let detector = Arc::clone(&harness.detector);
        let t0 = Instant::now();
        harness.orchestrator.enable().await;
        sleep_until(t0 + ms(100)).await;

        let Harness {
            orchestrator,
            captures,
            ..
        } = harness;
        orchestrator.dispose().await;

        sleep_until(t0 + ms(5_000)).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
        assert!(captures.lock().expect("captures lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_detector_counts_as_no_detection() {
        let sampler = Arc::new(FakeSampler {
            ready: AtomicBool::new(true),
        });
        let detector = Arc::new(PanickingDetector::default());
        let orchestrator = AutoCaptureOrchestrator::spawn(
            AutoCaptureConfig::default(),
            Collaborators {
                sampler,
                detector: Arc::clone(&detector) as Arc<dyn DetectionClient>,
                tones: Arc::new(RecordingTones::default()),
                on_capture: Arc::new(|_frame: CapturedFrame| {}),
            },
        );
        let t0 = Instant::now();
        orchestrator.enable().await;

        sleep_until(t0 + ms(1_600)).await;
        let signals = orchestrator.current();
        assert!(signals.enabled);
        assert_eq!(signals.status, TrackingState::Idle);
        assert_eq!(signals.zoom, 1.0);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);

        orchestrator.disable().await;
        assert!(!orchestrator.current().enabled);
        orchestrator.enable().await;
        assert!(orchestrator.current().enabled);
        orchestrator.dispose().await;
    }
}
