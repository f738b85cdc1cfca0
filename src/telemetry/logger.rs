//! Журнал сессии автосъёмки.
//!
//! `SessionTrace::start` spawns a task that follows the orchestrator's signal channel and turns
//! every observed change into a `SessionEvent` stamped with milliseconds since the session
//! started. Captures are recorded by the caller through `record_captured`. `stop` flushes the
//! last observed state and returns the whole trace as an `EventsFile`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::events::{EventsFile, SessionEvent, SCHEMA_VERSION};
use crate::models::signals::AutoCaptureSignals;

type SharedEvents = Arc<Mutex<Vec<SessionEvent>>>;

pub struct SessionTrace {
    session_id: String,
    start_ms: u64,
    started_at: Instant,
    events: SharedEvents,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
}

impl SessionTrace {
    #[must_use]
    pub fn start(signals: watch::Receiver<AutoCaptureSignals>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let start_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let started_at = Instant::now();
        let events: SharedEvents = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = oneshot::channel();

        let watcher = tokio::spawn(follow_signals(
            signals,
            stop_rx,
            started_at,
            Arc::clone(&events),
        ));

        log::info!("session_trace: started id={session_id}");
        Self {
            session_id,
            start_ms,
            started_at,
            events,
            stop_tx: Some(stop_tx),
            watcher: Some(watcher),
        }
    }

    pub fn record_captured(&self, capture_id: &str) {
        let ts = elapsed_ms(self.started_at);
        lock_events(&self.events).push(SessionEvent::Captured {
            ts,
            capture_id: capture_id.to_string(),
        });
    }

    pub async fn stop(mut self) -> EventsFile {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(watcher) = self.watcher.take() {
            if let Err(err) = watcher.await {
                log::warn!("session_trace: watcher failed: {err}");
            }
        }

        let mut events = std::mem::take(&mut *lock_events(&self.events));
        events.sort_by_key(SessionEvent::ts);
        log::info!(
            "session_trace: stopped id={} events={}",
            self.session_id,
            events.len()
        );

        EventsFile {
            schema_version: SCHEMA_VERSION,
            session_id: self.session_id.clone(),
            start_ms: self.start_ms,
            events,
        }
    }
}

impl Drop for SessionTrace {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

async fn follow_signals(
    mut signals: watch::Receiver<AutoCaptureSignals>,
    mut stop_rx: oneshot::Receiver<()>,
    started_at: Instant,
    events: SharedEvents,
) {
    let mut last = AutoCaptureSignals::default();
    record_change(&events, &mut last, *signals.borrow_and_update(), started_at);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => break,

            changed = signals.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = *signals.borrow_and_update();
                record_change(&events, &mut last, next, started_at);
            }
        }
    }

    let next = *signals.borrow();
    record_change(&events, &mut last, next, started_at);
}

fn record_change(
    events: &SharedEvents,
    last: &mut AutoCaptureSignals,
    next: AutoCaptureSignals,
    started_at: Instant,
) {
    let changes = signal_changes(last, &next, elapsed_ms(started_at));
    *last = next;
    if !changes.is_empty() {
        lock_events(events).extend(changes);
    }
}

/// Events describing the step from `prev` to `next`. Zoom alone is not an event; it is
/// carried on status changes.
pub fn signal_changes(
    prev: &AutoCaptureSignals,
    next: &AutoCaptureSignals,
    ts: u64,
) -> Vec<SessionEvent> {
    let mut changes = Vec::new();
    if next.enabled && !prev.enabled {
        changes.push(SessionEvent::Enabled { ts });
    }
    if next.status != prev.status {
        changes.push(SessionEvent::StatusChanged {
            ts,
            status: next.status,
            zoom: next.zoom,
        });
    }
    if next.countdown != prev.countdown {
        changes.push(SessionEvent::CountdownChanged {
            ts,
            countdown: next.countdown,
        });
    }
    if prev.enabled && !next.enabled {
        changes.push(SessionEvent::Disabled { ts });
    }
    changes
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

fn lock_events(events: &SharedEvents) -> MutexGuard<'_, Vec<SessionEvent>> {
    match events.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
