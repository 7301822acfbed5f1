//! Hardware video encode stage.
//!
//! One raw NV12 frame in, zero or one compressed packet out. The stage owns a
//! single scratch buffer sized to the stride-aligned frame; caller memory is
//! copied in and never referenced after `encode` returns.

#[cfg(feature = "ffmpeg")]
pub mod hw;

use anyhow::{Context, Result};
use bytes::Bytes;

const DEFAULT_FPS: u32 = 30;

/// Geometry and rate-control parameters for one encode session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second; 0 picks one from the frame size
    pub bitrate: u32,
}

impl EncoderSettings {
    pub fn hor_stride(&self) -> u32 {
        align16(self.width)
    }

    pub fn ver_stride(&self) -> u32 {
        align16(self.height)
    }

    /// Bytes in one stride-aligned NV12 frame
    pub fn frame_size(&self) -> usize {
        self.hor_stride() as usize * self.ver_stride() as usize * 3 / 2
    }

    /// Rows in the interleaved UV plane; odd heights round up
    pub fn chroma_rows(&self) -> u32 {
        (self.height + 1) / 2
    }

    /// Bytes in one UV row: one U/V pair per two luma columns, odd widths round up
    pub fn chroma_row_bytes(&self) -> u32 {
        (self.width + 1) & !1
    }

    pub fn fps(&self) -> u32 {
        if self.fps > 0 {
            self.fps
        } else {
            DEFAULT_FPS
        }
    }

    /// CBR target in bits per second
    pub fn target_bps(&self) -> u32 {
        if self.bitrate > 0 {
            self.bitrate
        } else {
            self.width.saturating_mul(self.height).saturating_mul(5)
        }
    }

    /// Upper CBR bound (target + 1/16)
    pub fn max_bps(&self) -> u32 {
        (u64::from(self.target_bps()) * 17 / 16) as u32
    }

    /// Lower CBR bound (target - 1/16)
    pub fn min_bps(&self) -> u32 {
        (u64::from(self.target_bps()) * 15 / 16) as u32
    }

    /// Group-of-pictures length: two seconds of frames
    pub fn gop(&self) -> u32 {
        self.fps() * 2
    }
}

fn align16(v: u32) -> u32 {
    (v + 15) & !15
}

/// One unit of compressed bitstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    data: Bytes,
    keyframe: bool,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, keyframe: bool) -> Self {
        Self {
            data: data.into(),
            keyframe,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }
}

/// The encoder's private input buffer.
///
/// Filled from caller memory before every submit: oversized input is
/// truncated, short input leaves the tail zeroed so no bytes of the previous
/// frame reach the encoder.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
}

impl ScratchBuffer {
    pub fn with_size(size: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .with_context(|| format!("Failed to allocate {} byte encoder scratch buffer", size))?;
        buf.resize(size, 0);
        Ok(Self { buf })
    }

    /// Copy `frame` in; returns how many bytes came from the caller
    pub fn fill(&mut self, frame: &[u8]) -> usize {
        let copied = frame.len().min(self.buf.len());
        self.buf[..copied].copy_from_slice(&frame[..copied]);
        self.buf[copied..].fill(0);
        copied
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// A hardware encode session.
///
/// At most one `encode` call is in flight; the worker that opened the
/// session is its only user.
pub trait VideoEncoder {
    /// Submit one raw frame. `Ok(None)` means the encoder kept the frame
    /// (lookahead/GOP buffering) and has no packet for this call.
    fn encode(&mut self, frame: &[u8]) -> Result<Option<EncodedPacket>>;

    /// Release encoder resources
    fn close(&mut self) -> Result<()>;

    /// Encoder name for logging
    fn name(&self) -> &str;
}

/// Open the hardware H.264 encoder for `settings`
pub fn open_hardware_encoder(settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
    #[cfg(feature = "ffmpeg")]
    {
        let encoder = hw::HwEncoder::open(settings)?;
        Ok(Box::new(encoder))
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        anyhow::bail!(
            "hardware encoder not available for {}x{}: rebuild with the `ffmpeg` feature",
            settings.width,
            settings.height
        )
    }
}
