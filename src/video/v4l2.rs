//! V4L2 memory-mapped capture.
//!
//! The mmap stream's `next()` always QBUFs the previously returned buffer
//! before it DQBUFs the next one. A dequeue that times out inside `next()`
//! would leave that buffer queued and the following call would queue it a
//! second time, so `next()` is only called once the device has signalled a
//! ready frame.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use v4l::buffer::Type as BufType;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::capture::{frame_ready, BufferSlots, RawBuffer, VideoSource};
use crate::session::VideoSessionConfig;

/// Buffers requested from the driver
const BUFFER_COUNT: u32 = 4;

/// Readiness poll; this is what makes `dequeue` non-blocking
const POLL_TIMEOUT_MS: i32 = 1;

/// Upper bound for a DQBUF after the device reported a ready frame
const DQBUF_TIMEOUT: Duration = Duration::from_secs(1);

pub struct V4l2Source {
    path: String,
    stream: Option<MmapStream<'static>>,
    started: bool,
    buffers: BufferSlots,
    in_flight: Option<usize>,
}

impl V4l2Source {
    pub fn open(config: &VideoSessionConfig) -> Result<Self> {
        let dev = Device::with_path(&config.device)
            .with_context(|| format!("Failed to open video device {}", config.device))?;

        let mut fmt = dev.format().context("VIDIOC_G_FMT failed")?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(b"NV12");
        let fmt = dev.set_format(&fmt).context("VIDIOC_S_FMT failed")?;

        if fmt.width != config.width || fmt.height != config.height {
            warn!(
                "[v4l2] driver negotiated {}x{} instead of {}x{}",
                fmt.width, fmt.height, config.width, config.height
            );
        }
        if fmt.fourcc != FourCC::new(b"NV12") {
            bail!(
                "{} does not support NV12 capture (got {})",
                config.device,
                fmt.fourcc
            );
        }

        if let Err(e) = dev.set_params(&Parameters::with_fps(config.fps)) {
            warn!("[v4l2] could not set {} fps: {}", config.fps, e);
        }

        let mut stream = MmapStream::with_buffers(&dev, BufType::VideoCapture, BUFFER_COUNT)
            .context("Failed to allocate capture buffers")?;
        stream.set_timeout(DQBUF_TIMEOUT);

        info!(
            "[v4l2] opened {} {}x{} {} ({} buffers)",
            config.device, fmt.width, fmt.height, fmt.fourcc, BUFFER_COUNT
        );

        Ok(Self {
            path: config.device.clone(),
            stream: Some(stream),
            started: false,
            buffers: BufferSlots::new(),
            in_flight: None,
        })
    }
}

impl VideoSource for V4l2Source {
    fn start(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().context("capture is closed")?;

        // Buffer 0 stays with us: the stream's first `next()` queues it
        // before its first DQBUF, exactly like a buffer handed back later.
        for index in 1..BUFFER_COUNT as usize {
            CaptureStream::queue(stream, index)
                .with_context(|| format!("VIDIOC_QBUF {} failed on {}", index, self.path))?;
        }
        Stream::start(stream)
            .with_context(|| format!("VIDIOC_STREAMON failed on {}", self.path))?;

        self.started = true;
        info!("[v4l2] capture started: {}", self.path);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<Option<RawBuffer<'_>>> {
        if !self.started {
            bail!("{} dequeue before start", self.path);
        }
        if let Some(index) = self.in_flight {
            bail!("{} buffer {} was never requeued", self.path, index);
        }
        let stream = self.stream.as_mut().context("capture is closed")?;

        // Nothing has been queued yet, so a miss here leaves the queue as it was.
        let ready = frame_ready(stream.handle().poll(libc::POLLIN, POLL_TIMEOUT_MS))
            .with_context(|| format!("poll failed on {}", self.path))?;
        if !ready {
            return Ok(None);
        }

        // Any failure past this point may have left the queue inconsistent,
        // so none of them is treated as a miss.
        let (buf, meta) = CaptureStream::next(stream)
            .with_context(|| format!("VIDIOC_DQBUF failed on {}", self.path))?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let sequence = meta.sequence;
        let data: &[u8] = &buf[..used];

        // v4l keeps the driver's buffer index private; the mapping address
        // identifies the buffer just as well.
        let index = self.buffers.slot_for(buf.as_ptr() as usize);
        self.in_flight = Some(index);

        Ok(Some(RawBuffer {
            index,
            sequence,
            data,
        }))
    }

    fn enqueue(&mut self, index: usize) -> Result<()> {
        // The QBUF for this buffer is issued by the stream at the start of
        // the next `next()`; until then the hold is ours to release.
        match self.in_flight.take() {
            Some(held) if held == index => Ok(()),
            Some(held) => {
                self.in_flight = Some(held);
                bail!("{} enqueue of buffer {} but {} is held", self.path, index, held)
            }
            None => bail!("{} enqueue of buffer {} that was not dequeued", self.path, index),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if self.started {
                Stream::stop(&mut stream).context("VIDIOC_STREAMOFF failed")?;
            }
            info!("[v4l2] closed {}", self.path);
        }
        self.started = false;
        self.in_flight = None;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.path
    }
}
