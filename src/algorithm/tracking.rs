//! Detection-stream classifier: `idle` / `tracking` / `locked`.
//!
//! Transitions are plain functions from (previous state, input, context) to the next state
//! plus the side effects the caller must perform. Nothing here owns a timer; the session
//! applies `TrackingEffect`s to its own deadlines.

use serde::{Deserialize, Serialize};

use crate::models::detection::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    /// No detection.
    #[default]
    Idle,
    /// Detection present, not yet steady.
    Tracking,
    /// Detection steady for the dwell time.
    Locked,
}

impl TrackingState {
    pub fn is_locked(self) -> bool {
        matches!(self, TrackingState::Locked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Tracking => "tracking",
            TrackingState::Locked => "locked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingEffect {
    StartSteadinessTimer,
    CancelSteadinessTimer,
    StartCountdown,
    CancelCountdown,
}

/// Bookkeeping the transitions need to see but do not own.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingContext {
    pub enabled: bool,
    pub steadiness_pending: bool,
    pub countdown_in_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: TrackingState,
    pub effects: Vec<TrackingEffect>,
}

impl Transition {
    fn stay(state: TrackingState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}

/// Applies one detection result.
///
/// A missing box is a hard downgrade: any pending steadiness timer is cancelled and the state
/// drops to `idle` even from `locked`. A present box never restarts a running steadiness
/// timer, so continuous detections reach `locked` after a bounded dwell.
pub fn on_detection(
    prev: TrackingState,
    detection: Option<&BoundingBox>,
    ctx: TrackingContext,
) -> Transition {
    if detection.is_none() {
        let mut effects = Vec::new();
        if ctx.steadiness_pending {
            effects.push(TrackingEffect::CancelSteadinessTimer);
        }
        if ctx.countdown_in_progress {
            effects.push(TrackingEffect::CancelCountdown);
        }
        return Transition {
            next: TrackingState::Idle,
            effects,
        };
    }

    let next = if prev.is_locked() {
        TrackingState::Locked
    } else {
        TrackingState::Tracking
    };

    let mut effects = Vec::new();
    if !ctx.steadiness_pending && !ctx.countdown_in_progress {
        effects.push(TrackingEffect::StartSteadinessTimer);
    }

    Transition { next, effects }
}

/// Applies an uninterrupted steadiness timer.
///
/// The countdown starts only on a transition *into* `locked`, so a lock episode runs at most
/// one countdown.
pub fn on_steadiness_elapsed(prev: TrackingState, ctx: TrackingContext) -> Transition {
    if !ctx.enabled {
        return Transition::stay(prev);
    }

    let mut effects = Vec::new();
    if !prev.is_locked() && !ctx.countdown_in_progress {
        effects.push(TrackingEffect::StartCountdown);
    }

    Transition {
        next: TrackingState::Locked,
        effects,
    }
}

/// Applies the feature being switched off: everything pending is cancelled.
pub fn on_disabled(ctx: TrackingContext) -> Transition {
    let mut effects = Vec::new();
    if ctx.steadiness_pending {
        effects.push(TrackingEffect::CancelSteadinessTimer);
    }
    if ctx.countdown_in_progress {
        effects.push(TrackingEffect::CancelCountdown);
    }
    Transition {
        next: TrackingState::Idle,
        effects,
    }
}
