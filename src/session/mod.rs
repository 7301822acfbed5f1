//! Recording run control
//!
//! This module composes sources, the encode stage and sinks into a run:
//! - `RunControl`: the shared stop signal and statistics
//! - `VideoWorker` / `AudioWorker`: one blocking pipeline loop per stream
//! - `Recorder`: starts workers, reporter and timer, and joins them all
//! - `shutdown_signal`: SIGINT/SIGTERM as one more stop writer

mod audio;
mod config;
mod control;
mod recorder;
mod report;
mod signal;
mod stats;
mod video;

pub use audio::{capped_read_len, AudioWorker};
pub use self::config::{byte_limit, frame_limit, AudioSessionConfig, VideoSessionConfig};
pub use control::{RunControl, StopReason, BACKOFF};
pub use recorder::{report_loop, stop_after, Recorder, REPORT_INTERVAL};
pub use report::{RunSummary, StreamKind, WorkerExit, WorkerReport};
pub use signal::shutdown_signal;
pub use stats::{Stats, StatsSnapshot, StatsTotals};
pub use video::VideoWorker;
