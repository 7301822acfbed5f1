//! Sound capture through cpal (ALSA on Linux).
//!
//! cpal delivers samples from a driver callback; the callback hands them to
//! the worker over a bounded channel so `read` keeps the blocking,
//! period-at-a-time contract.
//!
//! The ALSA host starts the PCM as soon as an input stream is built, so
//! `open` only resolves and checks the device and the stream is built in
//! `start`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use super::backend::{AudioFormat, AudioSource};
use super::device::{alsa_hint_names, proc_card_id};
use crate::session::AudioSessionConfig;

/// Periods the hand-off queue can hold before the callback starts dropping
const QUEUE_PERIODS: usize = 32;

pub struct DeviceCapture {
    name: String,
    format: AudioFormat,
    device: cpal::Device,
    stream: Option<cpal::Stream>,
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pending_pos: usize,
    period: Duration,
    overruns: Arc<AtomicU64>,
    closed: bool,
}

fn find_input_device(host: &cpal::Host, requested: &str) -> Result<cpal::Device> {
    if requested == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"));
    }

    let mut devices: Vec<cpal::Device> = host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .collect();
    let names: Vec<String> = devices.iter().map(|d| d.name().unwrap_or_default()).collect();

    let candidates = alsa_hint_names(requested, proc_card_id);
    for want in &candidates {
        if let Some(pos) = names.iter().position(|n| n == want) {
            if want != requested {
                debug!("[alsa] {} resolved to {}", requested, want);
            }
            return Ok(devices.swap_remove(pos));
        }
    }

    bail!(
        "input device '{}' not found (tried {}; available: {})",
        requested,
        candidates.join(", "),
        names.join(", ")
    )
}

impl DeviceCapture {
    pub fn open(config: &AudioSessionConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_input_device(&host, &config.device)?;

        let format = AudioFormat::s16le(config.sample_rate, config.channels, config.period_ms);

        let supported = device
            .supported_input_configs()
            .with_context(|| format!("Failed to query {}", config.device))?
            .any(|range| {
                range.channels() == format.channels
                    && range.sample_format() == cpal::SampleFormat::I16
                    && range.min_sample_rate().0 <= format.sample_rate
                    && format.sample_rate <= range.max_sample_rate().0
            });
        if !supported {
            bail!(
                "{} cannot capture S16_LE {}Hz ch={}",
                config.device,
                format.sample_rate,
                format.channels
            );
        }

        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(QUEUE_PERIODS);

        info!(
            "[alsa] opened {} {}Hz ch={} period={} frames chunk={} bytes",
            config.device,
            format.sample_rate,
            format.channels,
            format.frames_per_period,
            format.chunk_bytes()
        );

        Ok(Self {
            name: config.device.clone(),
            format,
            device,
            stream: None,
            tx: Some(tx),
            rx,
            pending: Vec::new(),
            pending_pos: 0,
            period: Duration::from_millis(u64::from(config.period_ms.max(1))),
            overruns: Arc::new(AtomicU64::new(0)),
            closed: false,
        })
    }

    fn build_stream(&self, tx: &Sender<Vec<u8>>, buffer_size: cpal::BufferSize) -> Result<cpal::Stream> {
        let stream_config = cpal::StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size,
        };
        let tx = tx.clone();
        let overruns = Arc::clone(&self.overruns);
        let device_name = self.name.clone();

        let stream = self.device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for sample in data {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                if let Err(TrySendError::Full(_)) = tx.try_send(bytes) {
                    overruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| error!("[alsa] stream error on {}: {}", device_name, err),
            None,
        )?;
        Ok(stream)
    }
}

impl AudioSource for DeviceCapture {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&mut self) -> Result<()> {
        if self.closed {
            bail!("{} is closed", self.name);
        }
        if self.stream.is_some() {
            return Ok(());
        }
        // The callbacks own the only senders from here on, so dropping the
        // stream disconnects the channel.
        let tx = self.tx.take().context("capture stream already consumed")?;

        let stream = match self.build_stream(&tx, cpal::BufferSize::Fixed(self.format.frames_per_period)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "[alsa] {} rejected a {} frame period ({}), using the driver default",
                    self.name, self.format.frames_per_period, e
                );
                let stream = self
                    .build_stream(&tx, cpal::BufferSize::Default)
                    .with_context(|| format!("Failed to open capture on {}", self.name))?;
                warn!(
                    "[alsa] {} chunk of {} bytes is nominal; callback periods follow the driver default",
                    self.name,
                    self.format.chunk_bytes()
                );
                stream
            }
        };
        drop(tx);

        stream
            .play()
            .with_context(|| format!("Failed to start capture on {}", self.name))?;
        self.stream = Some(stream);

        info!("[alsa] capture started: {}", self.name);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            bail!("{} is closed", self.name);
        }
        if self.stream.is_none() {
            bail!("{} read before start", self.name);
        }

        if self.pending_pos >= self.pending.len() {
            match self.rx.recv_timeout(self.period) {
                Ok(bytes) => {
                    self.pending = bytes;
                    self.pending_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("capture stream on {} went away", self.name)
                }
            }
        }

        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tx = None;

        let paused = match self.stream.take() {
            Some(stream) => {
                let paused = stream.pause();
                drop(stream);
                paused
            }
            None => Ok(()),
        };

        let overruns = self.overruns.load(Ordering::Relaxed);
        if overruns > 0 {
            warn!("[alsa] {} dropped {} periods on overrun", self.name, overruns);
        }
        info!("[alsa] closed {}", self.name);

        paused.with_context(|| format!("Failed to stop capture on {}", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
