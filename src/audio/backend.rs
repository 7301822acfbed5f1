use anyhow::Result;

use crate::session::AudioSessionConfig;

/// Bytes per sample: captures are signed 16-bit little-endian
pub const BYTES_PER_SAMPLE: u16 = 2;

/// PCM format negotiated with the sound device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bytes in one sample of one channel
    pub bytes_per_sample: u16,
    /// Frames delivered per hardware period
    pub frames_per_period: u32,
}

impl AudioFormat {
    /// Format for S16_LE interleaved capture with a period of `period_ms`
    pub fn s16le(sample_rate: u32, channels: u16, period_ms: u32) -> Self {
        let frames_per_period = (u64::from(sample_rate) * u64::from(period_ms) / 1000).max(1) as u32;
        Self {
            sample_rate,
            channels,
            bytes_per_sample: BYTES_PER_SAMPLE,
            frames_per_period,
        }
    }

    /// Bytes in one frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bytes_per_sample)
    }

    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.bytes_per_frame())
    }

    /// Bytes in one hardware period; the unit the audio worker reads in
    pub fn chunk_bytes(&self) -> usize {
        self.frames_per_period as usize * self.bytes_per_frame() as usize
    }
}

/// A blocking sample-read capture device.
///
/// The worker that opens a source is its only user.
pub trait AudioSource {
    /// Format fixed when the device was opened
    fn format(&self) -> AudioFormat;

    /// Begin delivering samples. Nothing is captured between open and start.
    fn start(&mut self) -> Result<()>;

    /// Read up to `buf.len()` bytes, blocking for at most about one period.
    /// `Ok(0)` means no data was ready; it is not an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Stop capture and release the device
    fn close(&mut self) -> Result<()>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Open the platform sound capture device described by `config`
pub fn open_audio_source(config: &AudioSessionConfig) -> Result<Box<dyn AudioSource>> {
    #[cfg(feature = "alsa")]
    {
        let source = super::input::DeviceCapture::open(config)?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "alsa"))]
    {
        anyhow::bail!(
            "audio capture from {} requires the `alsa` feature",
            config.device
        )
    }
}
