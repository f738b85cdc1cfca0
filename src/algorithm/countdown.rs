//! Pre-capture countdown: `N, N-1, ..., 1` one step apart, then capture.
//!
//! The controller holds the schedule as deadlines relative to the lock time; cancelling clears
//! every remaining step at once.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownCue {
    /// Show `remaining` and play the tick tone.
    Tick { remaining: u8 },
    /// Clear the display, play the capture tone and take the picture.
    Capture,
}

#[derive(Debug, Clone, Copy)]
pub struct CountdownConfig {
    pub seconds: u8,
    pub step: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: 2,
            step: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RunningCountdown {
    started_at: Instant,
    /// Index of the next cue; cue `k` is due at `started_at + k * step`.
    next_cue: u8,
}

#[derive(Debug, Clone)]
pub struct CountdownController {
    config: CountdownConfig,
    running: Option<RunningCountdown>,
    display: Option<u8>,
}

impl CountdownController {
    pub fn new(config: CountdownConfig) -> Self {
        Self {
            config,
            running: None,
            display: None,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.running.is_some()
    }

    /// Seconds remaining for display; `None` when no countdown is active.
    pub fn display(&self) -> Option<u8> {
        self.display
    }

    /// Starts a fresh sequence at `now` and returns the cue due immediately.
    ///
    /// Returns `None` without touching the running sequence if one is already in progress.
    pub fn start(&mut self, now: Instant) -> Option<CountdownCue> {
        if self.running.is_some() {
            return None;
        }
        self.running = Some(RunningCountdown {
            started_at: now,
            next_cue: 0,
        });
        self.advance()
    }

    /// Drops every remaining step. Returns whether anything was pending.
    pub fn cancel(&mut self) -> bool {
        self.display = None;
        self.running.take().is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.running
            .map(|running| running.started_at + self.config.step * u32::from(running.next_cue))
    }

    /// Emits every cue whose deadline is at or before `now`, in order.
    pub fn poll(&mut self, now: Instant) -> Vec<CountdownCue> {
        let mut cues = Vec::new();
        while self.next_deadline().is_some_and(|deadline| deadline <= now) {
            match self.advance() {
                Some(cue) => cues.push(cue),
                None => break,
            }
        }
        cues
    }

    fn advance(&mut self) -> Option<CountdownCue> {
        let running = self.running.as_mut()?;
        let index = running.next_cue;
        running.next_cue = index.saturating_add(1);

        if index >= self.config.seconds {
            self.running = None;
            self.display = None;
            return Some(CountdownCue::Capture);
        }

        let remaining = self.config.seconds - index;
        self.display = Some(remaining);
        Some(CountdownCue::Tick { remaining })
    }
}
