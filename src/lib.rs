// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod change_detector;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod notify;
pub mod scheduler;
pub mod source_chain;
pub mod state;
pub mod telemetry;
pub mod watch;

// ---- Re-exports for stable public API ----
pub use crate::change_detector::Classification;
pub use crate::context::AppContext;
pub use crate::error::{ErrorKind, WatchError};
pub use crate::extract::{ExtractedRecord, StructuredRecord};
pub use crate::watch::{CycleReport, Watch, WatchStatus};
