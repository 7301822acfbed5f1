use crate::audio::AudioFormat;
use crate::encoder::EncoderSettings;
use crate::sink::SinkTarget;

/// Everything the video worker needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSessionConfig {
    /// Capture device node (e.g. "/dev/video0")
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Where the elementary stream goes
    pub output: SinkTarget,
    /// Run duration in seconds, 0 = until stopped
    pub duration_sec: u32,
}

impl VideoSessionConfig {
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate: self.bitrate,
        }
    }

    /// Frames to capture before stopping on our own, `None` when unlimited
    pub fn frame_limit(&self) -> Option<u64> {
        frame_limit(self.duration_sec, self.fps)
    }
}

/// Everything the audio worker needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSessionConfig {
    /// Sound device identifier (e.g. "hw:0,0" or "default")
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Requested hardware period in milliseconds
    pub period_ms: u32,
    /// Where the PCM stream goes
    pub output: SinkTarget,
    /// Run duration in seconds, 0 = until stopped
    pub duration_sec: u32,
}

impl AudioSessionConfig {
    /// Bytes to write before stopping on our own, computed from the format
    /// the device actually negotiated. `None` when unlimited.
    pub fn byte_limit(&self, format: &AudioFormat) -> Option<u64> {
        byte_limit(self.duration_sec, format.sample_rate, format.bytes_per_frame())
    }
}

/// `duration_sec × fps`; a zero duration means no limit
pub fn frame_limit(duration_sec: u32, fps: u32) -> Option<u64> {
    if duration_sec == 0 || fps == 0 {
        return None;
    }
    Some(u64::from(duration_sec) * u64::from(fps))
}

/// `duration_sec × sample_rate × bytes_per_frame`; a zero duration means no limit
pub fn byte_limit(duration_sec: u32, sample_rate: u32, bytes_per_frame: u32) -> Option<u64> {
    if duration_sec == 0 {
        return None;
    }
    Some(u64::from(duration_sec) * u64::from(sample_rate) * u64::from(bytes_per_frame))
}
