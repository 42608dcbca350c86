//! # Error taxonomy
//! Typed failures for every stage of a watch cycle.
//!
//! Fetch and extract errors never escape a single source attempt: the source
//! chain records them and moves on. Only `PersistenceError`, `ConfigError`
//! and unknown-target lookups surface as `WatchError` from a cycle.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used in log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// DNS, connect, timeout. Transient; retried next cycle.
    Transport,
    /// Non-2xx status, unparseable body, missing anchor or fields.
    UpstreamFormat,
    /// State store unreadable or unwritable.
    Persistence,
    /// Invalid interval, malformed endpoint, inconsistent sources.
    Configuration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::UpstreamFormat => "upstream_format",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("upstream answered HTTP {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::HttpStatus(_) => ErrorKind::UpstreamFormat,
            FetchError::Timeout | FetchError::Network(_) => ErrorKind::Transport,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The expected anchor (table header, JSON path) is absent.
    #[error("anchor not found: {0}")]
    NotFound(String),

    #[error("incomplete record: {present} of {required} fields present")]
    Incomplete { present: usize, required: usize },

    #[error("malformed body: {0}")]
    Malformed(String),
}

/// Failure of one source in the chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Fetch(e) => e.kind(),
            SourceError::Extract(_) => ErrorKind::UpstreamFormat,
        }
    }
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub source: String,
    pub error: SourceError,
}

/// Every source in the chain failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("all {} sources exhausted{}", .attempts.len(), summarize(.attempts))]
pub struct Exhausted {
    pub attempts: Vec<SourceAttempt>,
}

fn summarize(attempts: &[SourceAttempt]) -> String {
    if attempts.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = attempts
        .iter()
        .map(|a| format!("{}: {}", a.source, a.error))
        .collect();
    format!(" ({})", parts.join("; "))
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is not valid JSON: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("encoding state: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target {target}: interval must be positive")]
    NonPositiveInterval { target: String },

    #[error("target {target}: invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        target: String,
        endpoint: String,
        reason: String,
    },

    #[error("target {target}: no sources configured")]
    NoSources { target: String },

    #[error("target {target}: priority {priority} used by more than one source")]
    DuplicatePriority { target: String, priority: i64 },

    #[error("target {target}: source name {source_name:?} used by more than one source")]
    DuplicateSourceName { target: String, source_name: String },

    #[error("target id {0:?} is defined more than once")]
    DuplicateTarget(String),

    #[error("target {target}: source {source_name} yields {found} records but target expects {expected}")]
    ExtractorMismatch {
        target: String,
        source_name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("target {target}: {reason}")]
    InvalidExtractor { target: String, reason: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed after {attempts} attempts: {message}")]
    Delivery { attempts: u8, message: String },
}

/// Errors that abandon a cycle or reject an operator command.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("unknown watch target: {0}")]
    UnknownTarget(String),
}

impl WatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchError::Persistence(_) => ErrorKind::Persistence,
            WatchError::Configuration(_) | WatchError::UnknownTarget(_) => {
                ErrorKind::Configuration
            }
        }
    }
}
