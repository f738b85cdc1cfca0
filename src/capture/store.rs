//! capture_store: сохранение снимков и журналов сессий.
//!
//! Layout: `{root}/{capture_id}/capture.jpg` + `capture.json`, and
//! `{root}/sessions/{session_id}/events.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::capture::frame::CapturedFrame;
use crate::error::StorageError;
use crate::models::capture::{CaptureRecord, SCHEMA_VERSION};
use crate::models::events::EventsFile;

const IMAGE_FILE: &str = "capture.jpg";
const RECORD_FILE: &str = "capture.json";
const SESSIONS_DIR: &str = "sessions";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureListItem {
    pub id: String,
    pub created_at: u64,
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    pub image_path: String,
    pub folder_path: String,
}

#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{Pictures}/IrisCapture`.
    pub fn default_root() -> Result<PathBuf, StorageError> {
        let base = dirs::picture_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
            .ok_or(StorageError::NoPicturesDir)?;
        Ok(base.join("IrisCapture"))
    }

    /// Writes the frame and its metadata under a fresh id.
    pub fn save(&self, frame: &CapturedFrame, zoom: f64) -> Result<CaptureRecord, StorageError> {
        let record = CaptureRecord {
            schema_version: SCHEMA_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp_millis().max(0) as u64,
            width: frame.width,
            height: frame.height,
            zoom,
            image_path: IMAGE_FILE.to_string(),
        };

        let folder = self.root.join(&record.id);
        create_dir(&folder)?;
        write_file(&folder.join(IMAGE_FILE), &frame.jpeg)?;
        let json = serde_json::to_string_pretty(&record)?;
        write_file(&folder.join(RECORD_FILE), json.as_bytes())?;

        log::info!(
            "save_capture: id={} {}x{} path={}",
            record.id,
            record.width,
            record.height,
            folder.display()
        );
        Ok(record)
    }

    pub fn save_events(&self, events: &EventsFile) -> Result<PathBuf, StorageError> {
        let folder = self.root.join(SESSIONS_DIR).join(&events.session_id);
        create_dir(&folder)?;
        let path = folder.join("events.json");
        let json = serde_json::to_string_pretty(events)?;
        write_file(&path, json.as_bytes())?;

        log::info!(
            "save_events: session={} events={} path={}",
            events.session_id,
            events.events.len(),
            path.display()
        );
        Ok(path)
    }

    /// Saved captures, newest first. Unreadable or foreign folders are skipped.
    pub fn list(&self) -> Result<Vec<CaptureListItem>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut captures = Vec::<CaptureListItem>::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("list_captures: failed to read dir entry: {e}");
                    continue;
                }
            };
            let folder_path = entry.path();
            let record_path = folder_path.join(RECORD_FILE);
            if !folder_path.is_dir() || !record_path.exists() {
                continue;
            }

            let record = match read_record(&record_path) {
                Some(record) => record,
                None => continue,
            };
            if record.schema_version != SCHEMA_VERSION {
                log::warn!(
                    "list_captures: skip {} due to schemaVersion={}",
                    record_path.display(),
                    record.schema_version
                );
                continue;
            }

            captures.push(CaptureListItem {
                image_path: folder_path
                    .join(&record.image_path)
                    .to_string_lossy()
                    .to_string(),
                folder_path: folder_path.to_string_lossy().to_string(),
                id: record.id,
                created_at: record.created_at,
                width: record.width,
                height: record.height,
                zoom: record.zoom,
            });
        }

        captures.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(captures)
    }
}

fn read_record(path: &Path) -> Option<CaptureRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("list_captures: failed to read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("list_captures: failed to parse {}: {e}", path.display());
            None
        }
    }
}

fn create_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::write(path, bytes).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}
