// src/state.rs
//! Durable per-target watch state.
//!
//! File format (JSON, pretty-printed):
//! ```json
//! { "targets": { "<target id>": {
//!     "lastRecordKey": "…", "lastRecord": {…},
//!     "lastCheckedAt": "2025-10-01T09:00:00Z", "lastSuccessAt": "…",
//!     "lastChangedAt": "…", "sourceUsed": "primary",
//!     "endpointOverride": "https://…", "intervalSecs": 900 } } }
//! ```
//! Unknown fields are ignored on load; every field is optional and defaults
//! to unset. Entries are decoded one target at a time: an entry this build
//! cannot read affects only that target, and saving another target writes
//! it back untouched. Top-level keys other than `targets` are kept too.
//! Writes go to a sibling temp file that is then renamed over the original,
//! so a state is either fully written or not at all.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex};

use crate::error::PersistenceError;
use crate::extract::ExtractedRecord;

/// Where a target stands in the change-detection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing persisted yet, or invalidated by an endpoint change.
    Unseen,
    /// A baseline record exists and new records are compared against it.
    Tracking,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchState {
    /// Filled from the map key on load.
    #[serde(skip)]
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_record: Option<ExtractedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_used: Option<String>,
    /// Set by an operator `set endpoint`; re-applied on restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_override: Option<String>,
    /// Set by an operator `set interval`; re-applied on restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

impl WatchState {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        match self.last_record_key {
            Some(_) => Phase::Tracking,
            None => Phase::Unseen,
        }
    }

    /// First successful read (or first after invalidation).
    pub fn observe_baseline(&mut self, record: ExtractedRecord, source: &str, now: DateTime<Utc>) {
        self.last_record_key = Some(record.change_key());
        self.last_record = Some(record);
        self.last_changed_at = Some(now);
        self.mark_success(source, now);
    }

    /// Change key identical to the stored one. Record and change time stay.
    pub fn observe_unchanged(&mut self, source: &str, now: DateTime<Utc>) {
        self.mark_success(source, now);
    }

    pub fn observe_change(&mut self, record: ExtractedRecord, source: &str, now: DateTime<Utc>) {
        self.observe_baseline(record, source, now);
    }

    /// A cycle ran but produced nothing usable.
    pub fn mark_checked(&mut self, now: DateTime<Utc>) {
        self.last_checked_at = Some(now);
    }

    fn mark_success(&mut self, source: &str, now: DateTime<Utc>) {
        self.last_checked_at = Some(now);
        self.last_success_at = Some(now);
        self.source_used = Some(source.to_string());
    }

    /// Forget the baseline so the next read is an initial observation.
    /// Timestamps are kept for status reporting.
    pub fn invalidate(&mut self) {
        self.last_record_key = None;
        self.last_record = None;
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Most recently persisted state, or `None` if the target was never seen.
    async fn load(&self, target_id: &str) -> Result<Option<WatchState>, PersistenceError>;
    /// Atomically replace the state stored under `state.target_id`.
    async fn save(&self, state: &WatchState) -> Result<(), PersistenceError>;
    /// Human-readable location for status output.
    fn location(&self) -> String;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    targets: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

/// All targets in one JSON file. Every load re-reads the file so comparisons
/// always see what is actually on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_file(&self) -> Result<StateFile, PersistenceError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        if raw.trim().is_empty() {
            return Ok(StateFile::default());
        }
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_file(&self, file: &StateFile) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
        }
        let bytes = serde_json::to_vec_pretty(file).map_err(PersistenceError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &bytes).await.map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| self.io_err(e))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, target_id: &str) -> Result<Option<WatchState>, PersistenceError> {
        let mut file = self.read_file().await?;
        let Some(raw) = file.targets.remove(target_id) else {
            return Ok(None);
        };
        let mut state: WatchState =
            serde_json::from_value(raw).map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        state.target_id = target_id.to_string();
        Ok(Some(state))
    }

    async fn save(&self, state: &WatchState) -> Result<(), PersistenceError> {
        // Whole-file read-modify-write; serialize writers so targets saving
        // concurrently do not drop each other's entries.
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await?;
        let entry = serde_json::to_value(state).map_err(PersistenceError::Encode)?;
        file.targets.insert(state.target_id.clone(), entry);
        self.write_file(&file).await
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local store for tests and dry runs. `set_failing(true)` makes
/// every call return a `PersistenceError`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, WatchState>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("store marked failing"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, target_id: &str) -> Result<Option<WatchState>, PersistenceError> {
        self.check()?;
        Ok(self.inner.lock().await.get(target_id).cloned())
    }

    async fn save(&self, state: &WatchState) -> Result<(), PersistenceError> {
        self.check()?;
        self.inner
            .lock()
            .await
            .insert(state.target_id.clone(), state.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}
