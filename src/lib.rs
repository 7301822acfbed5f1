pub mod audio;
pub mod backend;
pub mod config;
pub mod encoder;
pub mod session;
pub mod sink;
pub mod video;

pub use audio::{AudioFormat, AudioSource};
pub use backend::{Backend, SystemBackend};
pub use crate::config::{Cli, Config};
pub use encoder::{EncodedPacket, EncoderSettings, ScratchBuffer, VideoEncoder};
pub use session::{
    Recorder, RunControl, RunSummary, Stats, StatsSnapshot, StopReason, WorkerExit, WorkerReport,
};
pub use sink::{open_sink, Sink, SinkTarget};
pub use video::{RawBuffer, SequenceTracker, VideoSource};
