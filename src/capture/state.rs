//! Active auto-capture session state.
//!
//! `AnalysisSession` owns every piece of bookkeeping the capture flow needs (single-flight
//! flag, steadiness deadline, countdown schedule, zoom) as plain fields. It never sleeps or
//! spawns: callers feed it detection results and the current time, and perform the returned
//! `SessionEffect`s.

use tokio::time::Instant;

use crate::algorithm::countdown::{CountdownController, CountdownCue};
use crate::algorithm::tracking::{self, TrackingContext, TrackingEffect, TrackingState, Transition};
use crate::algorithm::zoom::ZoomEstimator;
use crate::capture::audio::Tone;
use crate::config::AutoCaptureConfig;
use crate::models::detection::DetectionResult;
use crate::models::signals::AutoCaptureSignals;

/// Work the session asks its driver to perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEffect {
    Beep(Tone),
    Capture,
}

pub struct AnalysisSession {
    config: AutoCaptureConfig,
    enabled: bool,
    /// True while a detection call is outstanding.
    in_flight: bool,
    state: TrackingState,
    zoom: ZoomEstimator,
    steadiness_deadline: Option<Instant>,
    countdown: CountdownController,
}

impl AnalysisSession {
    pub fn new(config: AutoCaptureConfig) -> Self {
        Self {
            zoom: ZoomEstimator::new(config.zoom),
            countdown: CountdownController::new(config.countdown()),
            config,
            enabled: false,
            in_flight: false,
            state: TrackingState::Idle,
            steadiness_deadline: None,
        }
    }

    pub fn config(&self) -> &AutoCaptureConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn zoom(&self) -> f64 {
        self.zoom.zoom()
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown.display()
    }

    pub fn steadiness_pending(&self) -> bool {
        self.steadiness_deadline.is_some()
    }

    pub fn countdown_in_progress(&self) -> bool {
        self.countdown.in_progress()
    }

    pub fn signals(&self) -> AutoCaptureSignals {
        AutoCaptureSignals {
            enabled: self.enabled,
            status: self.state,
            zoom: self.zoom.zoom(),
            countdown: self.countdown.display(),
        }
    }

    /// Starts a fresh session at `idle` with zoom 1. No-op when already enabled.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.reset();
        self.enabled = true;
        log::info!("auto_capture: enabled");
    }

    /// Tears the session down: every deadline is dropped before this returns.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        let transition = tracking::on_disabled(self.context());
        self.apply(transition, None);
        self.reset();
        self.enabled = false;
        log::info!("auto_capture: disabled");
    }

    fn reset(&mut self) {
        self.in_flight = false;
        self.state = TrackingState::Idle;
        self.zoom.reset();
        self.steadiness_deadline = None;
        self.countdown.cancel();
    }

    /// Claims the single-flight slot. Returns false (tick dropped) when disabled, the camera is
    /// not ready, or a call is already outstanding.
    pub fn try_begin_sample(&mut self, camera_ready: bool) -> bool {
        if !self.enabled || !camera_ready || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Applies the outcome of the outstanding detection call and releases the slot.
    pub fn complete_sample(&mut self, now: Instant, result: &DetectionResult) -> Vec<SessionEffect> {
        self.in_flight = false;
        if !self.enabled {
            return Vec::new();
        }

        let bbox = result.usable_box();
        log::debug!(
            "auto_capture: detection success={} box={:?} error={:?}",
            result.success,
            bbox,
            result.error
        );

        let transition = tracking::on_detection(self.state, bbox.as_ref(), self.context());
        self.zoom.update(bbox.as_ref());
        self.apply(transition, Some(now))
    }

    /// Runs every timer due at `now`. Deadlines are re-checked against the current flags so a
    /// timer that became irrelevant does nothing.
    pub fn fire_due_timers(&mut self, now: Instant) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if !self.enabled {
            self.steadiness_deadline = None;
            self.countdown.cancel();
            return effects;
        }

        if self.steadiness_deadline.is_some_and(|deadline| deadline <= now) {
            self.steadiness_deadline = None;
            let transition = tracking::on_steadiness_elapsed(self.state, self.context());
            effects.extend(self.apply(transition, Some(now)));
        }

        if self.countdown.in_progress() {
            if self.state.is_locked() {
                for cue in self.countdown.poll(now) {
                    effects.extend(self.cue_effects(cue));
                }
            } else if self.countdown.cancel() {
                log::info!("auto_capture: countdown cancelled, state={}", self.state.as_str());
            }
        }

        effects
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.enabled {
            return None;
        }
        match (self.steadiness_deadline, self.countdown.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn context(&self) -> TrackingContext {
        TrackingContext {
            enabled: self.enabled,
            steadiness_pending: self.steadiness_deadline.is_some(),
            countdown_in_progress: self.countdown.in_progress(),
        }
    }

    fn apply(&mut self, transition: Transition, now: Option<Instant>) -> Vec<SessionEffect> {
        let prev = self.state;
        self.state = transition.next;
        if prev != self.state {
            log::info!(
                "auto_capture: state {} -> {}",
                prev.as_str(),
                self.state.as_str()
            );
        }

        let mut effects = Vec::new();
        for effect in transition.effects {
            match effect {
                TrackingEffect::StartSteadinessTimer => {
                    if let Some(now) = now {
                        self.steadiness_deadline = Some(now + self.config.steadiness());
                    }
                }
                TrackingEffect::CancelSteadinessTimer => {
                    self.steadiness_deadline = None;
                }
                TrackingEffect::StartCountdown => {
                    let Some(now) = now else { continue };
                    if let Some(cue) = self.countdown.start(now) {
                        log::info!(
                            "auto_capture: locked, countdown started seconds={}",
                            self.config.countdown_seconds
                        );
                        effects.extend(self.cue_effects(cue));
                    }
                }
                TrackingEffect::CancelCountdown => {
                    if self.countdown.cancel() {
                        log::info!("auto_capture: countdown cancelled, state={}", self.state.as_str());
                    }
                }
            }
        }
        effects
    }

    fn cue_effects(&self, cue: CountdownCue) -> Vec<SessionEffect> {
        match cue {
            CountdownCue::Tick { remaining } => {
                log::debug!("auto_capture: countdown {remaining}");
                vec![SessionEffect::Beep(self.config.tick_tone)]
            }
            CountdownCue::Capture => {
                log::info!("auto_capture: countdown finished, capturing");
                vec![
                    SessionEffect::Beep(self.config.capture_tone),
                    SessionEffect::Capture,
                ]
            }
        }
    }
}
