use anyhow::Result;

use crate::audio::{self, AudioSource};
use crate::encoder::{self, EncoderSettings, VideoEncoder};
use crate::session::{AudioSessionConfig, VideoSessionConfig};
use crate::sink::{self, Sink, SinkTarget};
use crate::video::{self, VideoSource};

/// Opens the devices and outputs a run needs.
///
/// Shared by both workers; each call hands back a fresh, exclusively owned
/// resource that is used and closed on the calling worker's thread.
///
/// Implementations:
/// - `SystemBackend`: V4L2 capture, hardware encoder, sound device, files
/// - test doubles with scripted behaviour
pub trait Backend: Send + Sync {
    fn open_video_source(&self, config: &VideoSessionConfig) -> Result<Box<dyn VideoSource>>;

    fn open_encoder(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>>;

    fn open_audio_source(&self, config: &AudioSessionConfig) -> Result<Box<dyn AudioSource>>;

    fn open_sink(&self, target: &SinkTarget) -> Result<Box<dyn Sink>>;
}

/// The real devices, as enabled by cargo features
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl Backend for SystemBackend {
    fn open_video_source(&self, config: &VideoSessionConfig) -> Result<Box<dyn VideoSource>> {
        video::open_video_source(config)
    }

    fn open_encoder(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        encoder::open_hardware_encoder(settings)
    }

    fn open_audio_source(&self, config: &AudioSessionConfig) -> Result<Box<dyn AudioSource>> {
        audio::open_audio_source(config)
    }

    fn open_sink(&self, target: &SinkTarget) -> Result<Box<dyn Sink>> {
        sink::open_sink(target)
    }
}
