//! Схема журнала сессии автосъёмки (events.json).
//! schemaVersion: 1

use serde::{Deserialize, Serialize};

use crate::algorithm::tracking::TrackingState;

pub const SCHEMA_VERSION: u32 = 1;

/// One observable change during an auto-capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Enabled {
        /// Миллисекунды от начала сессии.
        ts: u64,
    },
    Disabled {
        ts: u64,
    },
    StatusChanged {
        ts: u64,
        status: TrackingState,
        zoom: f64,
    },
    CountdownChanged {
        ts: u64,
        countdown: Option<u8>,
    },
    Captured {
        ts: u64,
        #[serde(rename = "captureId", alias = "capture_id")]
        capture_id: String,
    },
}

impl SessionEvent {
    pub fn ts(&self) -> u64 {
        match self {
            SessionEvent::Enabled { ts }
            | SessionEvent::Disabled { ts }
            | SessionEvent::StatusChanged { ts, .. }
            | SessionEvent::CountdownChanged { ts, .. }
            | SessionEvent::Captured { ts, .. } => *ts,
        }
    }
}

/// Корневой контейнер файла events.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsFile {
    pub schema_version: u32,
    pub session_id: String,
    /// Unix timestamp (мс) старта сессии.
    pub start_ms: u64,
    pub events: Vec<SessionEvent>,
}
