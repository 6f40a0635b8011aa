//! Server log pipeline: classification, incremental tailing and the recent
//! activity feed.

pub mod activity;
pub mod classifier;
pub mod tailer;

pub use activity::ActivityFeed;
pub use classifier::{classify_line, LogEvent};
pub use tailer::{LogTailer, TailerHandle, TailerSettings};

use chrono::{DateTime, Utc};

/// A classified event together with the time it is attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    pub event: LogEvent,
    pub observed_at: DateTime<Utc>,
}
