//! # Change Detector
//! Pure classification of a freshly resolved record against the most recently
//! persisted state. No I/O; the watch cycle applies the result.
//!
//! `Unseen → (initial observation) → Tracking`. Inside `Tracking` only the
//! change key decides between "no change" and "changed", so cosmetic
//! reformatting of informational fields never alerts.

use std::fmt;

use serde::Serialize;

use crate::extract::ExtractedRecord;
use crate::state::{Phase, WatchState};

/// Result of comparing one resolved record with the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// First successful read for a target in `Unseen`. Stored as baseline,
    /// not announced as a change.
    InitialObservation,
    NoChange,
    Changed,
}

/// What a whole cycle amounted to, as reported to callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    InitialObservation,
    NoChange,
    Changed,
    /// Every source failed; state was not advanced.
    Exhausted,
}

impl From<Detection> for Classification {
    fn from(d: Detection) -> Self {
        match d {
            Detection::InitialObservation => Classification::InitialObservation,
            Detection::NoChange => Classification::NoChange,
            Detection::Changed => Classification::Changed,
        }
    }
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::InitialObservation => "initial_observation",
            Classification::NoChange => "no_change",
            Classification::Changed => "changed",
            Classification::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compare a successfully resolved record. `previous` is what the store returned.
pub fn detect(previous: Option<&WatchState>, record: &ExtractedRecord) -> Detection {
    let Some(prev) = previous else {
        return Detection::InitialObservation;
    };
    match (prev.phase(), prev.last_record_key.as_deref()) {
        (Phase::Tracking, Some(key)) if key == record.change_key() => Detection::NoChange,
        (Phase::Tracking, _) => Detection::Changed,
        (Phase::Unseen, _) => Detection::InitialObservation,
    }
}
