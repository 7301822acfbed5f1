use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::control::StopReason;
use super::stats::StatsTotals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn tag(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// How a worker's run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Something failed while opening; capture never started
    OpenFailed,
    /// The stop signal was observed
    Stopped,
    /// The frame or byte limit was reached
    LimitReached,
    /// A capture, encode or write failure ended the run
    Failed,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerExit::OpenFailed => "open failed",
            WorkerExit::Stopped => "stopped",
            WorkerExit::LimitReached => "limit reached",
            WorkerExit::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What one worker did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub stream: StreamKind,
    /// Frames (video) or chunks (audio) taken from the source
    pub units: u64,
    /// Bytes written to the sink
    pub bytes: u64,
    pub exit: WorkerExit,
}

impl WorkerReport {
    pub fn open_failed(stream: StreamKind) -> Self {
        Self {
            stream,
            units: 0,
            bytes: 0,
            exit: WorkerExit::OpenFailed,
        }
    }
}

/// Outcome of a whole recorder run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub video: WorkerReport,
    pub audio: WorkerReport,
    pub totals: StatsTotals,
    pub stop_reason: Option<StopReason>,
}

impl RunSummary {
    pub fn duration_secs(&self) -> f64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds() as f64
            / 1000.0
    }
}

/// Teardown never fails a worker; a failed close is logged and skipped.
pub(crate) fn close_logged(stream: StreamKind, what: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("[{}] failed to close {}: {:#}", stream.tag(), what, e);
    }
}
