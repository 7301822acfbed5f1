use std::sync::Arc;
use std::thread;

use anyhow::Result;
use tracing::{debug, error, info};

use super::config::VideoSessionConfig;
use super::control::{RunControl, BACKOFF};
use super::report::{close_logged, StreamKind, WorkerExit, WorkerReport};
use crate::backend::Backend;
use crate::encoder::VideoEncoder;
use crate::sink::Sink;
use crate::video::{SequenceTracker, VideoSource};

const STREAM: StreamKind = StreamKind::Video;

/// Capture → encode → sink loop for the video stream
pub struct VideoWorker {
    config: VideoSessionConfig,
    control: RunControl,
    backend: Arc<dyn Backend>,
}

impl VideoWorker {
    pub fn new(config: VideoSessionConfig, control: RunControl, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            control,
            backend,
        }
    }

    /// Open everything, pump frames until stop/limit/failure, then tear down.
    ///
    /// Never returns an error: failures are logged, counted as one dropped
    /// unit and reported through the returned `WorkerExit`.
    pub fn run(self) -> WorkerReport {
        let stats = self.control.stats();
        let cfg = &self.config;

        let mut source = match self.backend.open_video_source(cfg) {
            Ok(source) => source,
            Err(e) => {
                error!("[video] capture open failed: {}: {:#}", cfg.device, e);
                stats.record_dropped(1);
                return WorkerReport::open_failed(STREAM);
            }
        };

        let mut encoder = match self.backend.open_encoder(&cfg.encoder_settings()) {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("[video] encoder init failed: {:#}", e);
                stats.record_dropped(1);
                close_logged(STREAM, "capture", source.close());
                return WorkerReport::open_failed(STREAM);
            }
        };

        let mut sink = match self.backend.open_sink(&cfg.output) {
            Ok(sink) => sink,
            Err(e) => {
                error!("[video] sink open failed: {}: {:#}", cfg.output, e);
                stats.record_dropped(1);
                close_logged(STREAM, "encoder", encoder.close());
                close_logged(STREAM, "capture", source.close());
                return WorkerReport::open_failed(STREAM);
            }
        };

        // Streaming starts only once every stage is ready to take frames.
        if let Err(e) = source.start() {
            error!("[video] capture start failed: {}: {:#}", cfg.device, e);
            stats.record_dropped(1);
            close_logged(STREAM, "sink", sink.close());
            close_logged(STREAM, "encoder", encoder.close());
            close_logged(STREAM, "capture", source.close());
            return WorkerReport::open_failed(STREAM);
        }

        info!(
            "[video] start encode -> {} ({}x{}@{}, {})",
            sink.describe(),
            cfg.width,
            cfg.height,
            cfg.fps,
            encoder.name()
        );

        let report = self.pump(source.as_mut(), encoder.as_mut(), sink.as_mut());

        info!(
            "[video] done, frames={} bytes={} ({})",
            report.units, report.bytes, report.exit
        );

        close_logged(STREAM, "sink", sink.close());
        close_logged(STREAM, "encoder", encoder.close());
        close_logged(STREAM, "capture", source.close());

        report
    }

    fn pump(
        &self,
        source: &mut dyn VideoSource,
        encoder: &mut dyn VideoEncoder,
        sink: &mut dyn Sink,
    ) -> WorkerReport {
        let stats = self.control.stats();
        let limit = self.config.frame_limit();
        let mut sequences = SequenceTracker::new();
        let mut frames = 0u64;
        let mut bytes = 0u64;

        let exit = loop {
            if self.control.is_stopped() {
                break WorkerExit::Stopped;
            }
            if limit.is_some_and(|limit| frames >= limit) {
                break WorkerExit::LimitReached;
            }

            let (index, encoded) = match source.dequeue() {
                Ok(Some(buf)) => {
                    let gap = sequences.observe(buf.sequence);
                    if gap > 0 {
                        debug!("[video] sequence jump to {}: {} frames lost", buf.sequence, gap);
                        stats.record_dropped(gap);
                    }
                    (buf.index, encoder.encode(buf.data))
                }
                Ok(None) => {
                    thread::sleep(BACKOFF);
                    continue;
                }
                Err(e) => {
                    error!("[video] dequeue failed on {}: {:#}", self.config.device, e);
                    stats.record_dropped(1);
                    break WorkerExit::Failed;
                }
            };

            // The encoder has its own copy now; give the buffer back before
            // anything downstream can fail.
            let requeued = source.enqueue(index);
            frames += 1;

            let written = encoded.and_then(|packet| write_packet(sink, packet));
            match written {
                Ok(n) => {
                    stats.record_video_frame();
                    stats.record_encoded_bytes(n);
                    bytes += n;
                }
                Err(e) => {
                    error!("[video] frame {} failed: {:#}", frames, e);
                    stats.record_dropped(1);
                    break WorkerExit::Failed;
                }
            }

            if let Err(e) = requeued {
                error!("[video] requeue of buffer {} failed: {:#}", index, e);
                stats.record_dropped(1);
                break WorkerExit::Failed;
            }
        };

        WorkerReport {
            stream: STREAM,
            units: frames,
            bytes,
            exit,
        }
    }
}

/// Write a packet if the encoder produced one; returns bytes persisted
fn write_packet(sink: &mut dyn Sink, packet: Option<crate::encoder::EncodedPacket>) -> Result<u64> {
    match packet {
        Some(packet) if !packet.is_empty() => {
            sink.write(packet.data())?;
            Ok(packet.len() as u64)
        }
        _ => Ok(0),
    }
}
