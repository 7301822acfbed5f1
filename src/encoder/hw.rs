//! Hardware H.264 encoding through FFmpeg's vendor encoders.
//!
//! Tries the SoC encoders in order and opens the first one available with
//! CBR rate control. There is no software fallback: a board without a
//! hardware encoder fails `open`.
//!
//! Only encoders that accept NV12 frames from system memory are listed.
//! VAAPI, QSV and NVENC need a hardware frames context and are not used.

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::{Dictionary, Packet, Rational};
use tracing::info;

use super::{EncodedPacket, EncoderSettings, ScratchBuffer, VideoEncoder};

/// Lookup order: Rockchip MPP first, then the kernel mem2mem path
pub const HW_H264_ENCODERS: &[&str] = &["h264_rkmpp", "h264_v4l2m2m"];

pub fn find_hw_h264_encoder() -> Option<ffmpeg_next::Codec> {
    for name in HW_H264_ENCODERS {
        if let Some(codec) = ffmpeg_next::encoder::find_by_name(name) {
            info!("[encoder] found hardware encoder: {}", name);
            return Some(codec);
        }
    }
    None
}

pub struct HwEncoder {
    encoder: Option<ffmpeg_next::codec::encoder::Video>,
    frame: ffmpeg_next::frame::Video,
    scratch: ScratchBuffer,
    settings: EncoderSettings,
    codec_name: String,
    frame_index: i64,
}

impl HwEncoder {
    pub fn open(settings: &EncoderSettings) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialise FFmpeg")?;

        let codec = find_hw_h264_encoder()
            .ok_or_else(|| anyhow!("no hardware H.264 encoder available"))?;
        let codec_name = codec.name().to_string();

        let fps = settings.fps() as i32;
        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("Failed to create video encoder context")?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::NV12);
        encoder.set_time_base(Rational::new(1, fps));
        encoder.set_frame_rate(Some(Rational::new(fps, 1)));
        encoder.set_gop(settings.gop());
        encoder.set_bit_rate(settings.target_bps() as usize);
        encoder.set_max_bit_rate(settings.max_bps() as usize);

        let mut opts = Dictionary::new();
        opts.set("rc_mode", "CBR");
        opts.set("minrate", &settings.min_bps().to_string());
        opts.set("maxrate", &settings.max_bps().to_string());

        let encoder = encoder
            .open_with(opts)
            .with_context(|| format!("Failed to open encoder {}", codec_name))?;

        let scratch = ScratchBuffer::with_size(settings.frame_size())?;
        let frame = ffmpeg_next::frame::Video::new(Pixel::NV12, settings.width, settings.height);

        info!(
            "[encoder] {} init ok {}x{} fps={} bitrate={} gop={}",
            codec_name,
            settings.width,
            settings.height,
            settings.fps(),
            settings.target_bps(),
            settings.gop()
        );

        Ok(Self {
            encoder: Some(encoder),
            frame,
            scratch,
            settings: *settings,
            codec_name,
            frame_index: 0,
        })
    }

    /// Lay the stride-aligned scratch image out into the FFmpeg frame planes
    fn load_frame(&mut self) {
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        let hor_stride = self.settings.hor_stride() as usize;
        let chroma_offset = hor_stride * self.settings.ver_stride() as usize;
        let src = self.scratch.as_slice();

        let y_stride = self.frame.stride(0);
        let y_plane = self.frame.data_mut(0);
        for row in 0..height {
            let from = row * hor_stride;
            y_plane[row * y_stride..row * y_stride + width]
                .copy_from_slice(&src[from..from + width]);
        }

        let uv_rows = self.settings.chroma_rows() as usize;
        let uv_width = self.settings.chroma_row_bytes() as usize;
        let uv_stride = self.frame.stride(1);
        let uv_plane = self.frame.data_mut(1);
        for row in 0..uv_rows {
            let from = chroma_offset + row * hor_stride;
            uv_plane[row * uv_stride..row * uv_stride + uv_width]
                .copy_from_slice(&src[from..from + uv_width]);
        }
    }
}

impl VideoEncoder for HwEncoder {
    fn encode(&mut self, frame: &[u8]) -> Result<Option<EncodedPacket>> {
        if frame.is_empty() {
            bail!("encode called with no input data");
        }
        if self.encoder.is_none() {
            bail!("encoder {} is closed", self.codec_name);
        }

        self.scratch.fill(frame);
        self.load_frame();
        self.frame.set_pts(Some(self.frame_index));
        self.frame_index += 1;

        let encoder = self.encoder.as_mut().context("encoder is closed")?;
        encoder
            .send_frame(&self.frame)
            .with_context(|| format!("{} rejected frame {}", self.codec_name, self.frame_index - 1))?;

        let mut packet = Packet::empty();
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                let data = packet.data().map(Bytes::copy_from_slice).unwrap_or_default();
                Ok(Some(EncodedPacket::new(data, packet.is_key())))
            }
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("{} receive_packet failed", self.codec_name)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut encoder) = self.encoder.take() {
            info!(
                "[encoder] {} deinit after {} frames",
                self.codec_name, self.frame_index
            );
            // Packets still held inside the encoder are discarded with it.
            encoder
                .send_eof()
                .with_context(|| format!("{} send_eof failed", self.codec_name))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.codec_name
    }
}
