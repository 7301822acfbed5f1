use std::sync::Arc;
use std::thread;

use anyhow::{ensure, Context, Result};
use tracing::{error, info};

use super::config::AudioSessionConfig;
use super::control::{RunControl, BACKOFF};
use super::report::{close_logged, StreamKind, WorkerExit, WorkerReport};
use crate::audio::AudioSource;
use crate::backend::Backend;
use crate::sink::Sink;

const STREAM: StreamKind = StreamKind::Audio;

/// Capture → sink loop for the audio stream
pub struct AudioWorker {
    config: AudioSessionConfig,
    control: RunControl,
    backend: Arc<dyn Backend>,
}

impl AudioWorker {
    pub fn new(config: AudioSessionConfig, control: RunControl, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            control,
            backend,
        }
    }

    /// Open the device and sink, copy chunks until stop/limit/failure, then
    /// tear down. Failures are logged and counted, never returned.
    pub fn run(self) -> WorkerReport {
        let stats = self.control.stats();
        let cfg = &self.config;

        let mut source = match self.backend.open_audio_source(cfg) {
            Ok(source) => source,
            Err(e) => {
                error!("[audio] capture open failed: {}: {:#}", cfg.device, e);
                stats.record_dropped(1);
                return WorkerReport::open_failed(STREAM);
            }
        };

        let mut sink = match self.backend.open_sink(&cfg.output) {
            Ok(sink) => sink,
            Err(e) => {
                error!("[audio] sink open failed: {}: {:#}", cfg.output, e);
                stats.record_dropped(1);
                close_logged(STREAM, "capture", source.close());
                return WorkerReport::open_failed(STREAM);
            }
        };

        let chunk = source.format().chunk_bytes();
        let mut buf = match chunk_buffer(chunk) {
            Ok(buf) => buf,
            Err(e) => {
                error!("[audio] {:#}", e);
                stats.record_dropped(1);
                close_logged(STREAM, "sink", sink.close());
                close_logged(STREAM, "capture", source.close());
                return WorkerReport::open_failed(STREAM);
            }
        };

        if let Err(e) = source.start() {
            error!("[audio] capture start failed: {}: {:#}", cfg.device, e);
            stats.record_dropped(1);
            close_logged(STREAM, "sink", sink.close());
            close_logged(STREAM, "capture", source.close());
            return WorkerReport::open_failed(STREAM);
        }

        let format = source.format();
        info!(
            "[audio] start capture -> {} ({}Hz ch={} chunk={} bytes)",
            sink.describe(),
            format.sample_rate,
            format.channels,
            chunk
        );

        let report = self.pump(source.as_mut(), sink.as_mut(), &mut buf);

        info!(
            "[audio] done, bytes={} chunks={} ({})",
            report.bytes, report.units, report.exit
        );

        close_logged(STREAM, "sink", sink.close());
        close_logged(STREAM, "capture", source.close());

        report
    }

    fn pump(&self, source: &mut dyn AudioSource, sink: &mut dyn Sink, buf: &mut [u8]) -> WorkerReport {
        let stats = self.control.stats();
        let limit = self.config.byte_limit(&source.format());
        let mut chunks = 0u64;
        let mut written = 0u64;

        let exit = loop {
            if self.control.is_stopped() {
                break WorkerExit::Stopped;
            }

            // Never ask for more than is left under the limit.
            let want = match limit {
                Some(limit) if written >= limit => break WorkerExit::LimitReached,
                Some(limit) => capped_read_len(buf.len(), limit - written),
                None => buf.len(),
            };

            let n = match source.read(&mut buf[..want]) {
                Ok(0) => {
                    thread::sleep(BACKOFF);
                    continue;
                }
                Ok(n) => n.min(want),
                Err(e) => {
                    error!("[audio] read failed on {}: {:#}", source.name(), e);
                    stats.record_dropped(1);
                    break WorkerExit::Failed;
                }
            };

            if let Err(e) = sink.write(&buf[..n]) {
                error!("[audio] write failed: {:#}", e);
                stats.record_dropped(1);
                break WorkerExit::Failed;
            }

            written += n as u64;
            chunks += 1;
            stats.record_audio_chunk();
        };

        WorkerReport {
            stream: STREAM,
            units: chunks,
            bytes: written,
            exit,
        }
    }
}

/// Bytes to ask the device for when `remaining` bytes are left under the limit
pub fn capped_read_len(chunk: usize, remaining: u64) -> usize {
    chunk.min(usize::try_from(remaining).unwrap_or(usize::MAX))
}

fn chunk_buffer(size: usize) -> Result<Vec<u8>> {
    ensure!(size > 0, "device reported a zero-byte period");
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .with_context(|| format!("Failed to allocate {} byte audio chunk", size))?;
    buf.resize(size, 0);
    Ok(buf)
}
