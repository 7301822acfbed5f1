use std::fmt;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::warn;

use crate::session::{AudioSessionConfig, VideoSessionConfig};
use crate::sink::SinkTarget;

/// Environment variable prefix; nested keys use `__` (EDGE_RECORDER_VIDEO__FPS)
pub const ENV_PREFIX: &str = "EDGE_RECORDER";

const DEFAULT_FPS: u32 = 30;
const DEFAULT_BITRATE: u32 = 2_000_000;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_PERIOD_MS: u32 = 20;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
    /// Recording length in seconds; 0 records until stopped
    pub duration_sec: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VideoConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// H.264 target bitrate in bits per second
    pub bitrate: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Hardware period (one chunk) in milliseconds
    pub period_ms: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Target for the H.264 elementary stream
    pub video: String,
    /// Target for the raw PCM stream
    pub audio: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            output: OutputConfig::default(),
            duration_sec: 10,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            fps: DEFAULT_FPS,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "hw:0,0".to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            period_ms: DEFAULT_PERIOD_MS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video: "out.h264".to_string(),
            audio: "out.pcm".to_string(),
        }
    }
}

/// Command-line flags; each one overrides the file/environment value
#[derive(Debug, Default, Parser)]
#[command(name = "edge-recorder", about = "Record H.264 video and raw PCM audio from local devices")]
pub struct Cli {
    /// Config file (toml/yaml/json), layered under env and flags
    #[arg(long)]
    pub config: Option<String>,

    /// Video device node [default: /dev/video0]
    #[arg(long = "video-dev")]
    pub video_dev: Option<String>,

    /// Capture size as WxH [default: 1280x720]
    #[arg(long, value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Capture frame rate [default: 30]
    #[arg(long)]
    pub fps: Option<u32>,

    /// H.264 target bitrate in bps [default: 2000000]
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// Sound capture device [default: hw:0,0]
    #[arg(long = "audio-dev")]
    pub audio_dev: Option<String>,

    /// Audio sample rate in Hz [default: 48000]
    #[arg(long = "sr")]
    pub sample_rate: Option<u32>,

    /// Audio channels [default: 2]
    #[arg(long = "ch")]
    pub channels: Option<u16>,

    /// Audio period in milliseconds [default: 20]
    #[arg(long = "chunk-ms")]
    pub chunk_ms: Option<u32>,

    /// Record duration in seconds, 0 = until interrupted [default: 10]
    #[arg(long = "sec")]
    pub duration_sec: Option<u32>,

    /// Output for the H.264 stream [default: out.h264]
    #[arg(long = "out-h264")]
    pub out_h264: Option<String>,

    /// Output for the PCM stream [default: out.pcm]
    #[arg(long = "out-pcm")]
    pub out_pcm: Option<String>,
}

/// Parse "1920x1080" into (width, height)
pub fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once(|c: char| c == 'x' || c == 'X')
        .with_context(|| format!("invalid size '{}', expected WxH", s))?;
    let w: u32 = w.trim().parse().with_context(|| format!("invalid width in '{}'", s))?;
    let h: u32 = h.trim().parse().with_context(|| format!("invalid height in '{}'", s))?;
    if w == 0 || h == 0 {
        bail!("invalid size '{}': width and height must be positive", s);
    }
    Ok((w, h))
}

impl Config {
    /// Defaults, then the optional config file, then the environment, then flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().context("Failed to read configuration")?;
        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        cfg.apply_cli(cli);
        cfg.normalize()?;
        Ok(cfg)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dev) = &cli.video_dev {
            self.video.device = dev.clone();
        }
        if let Some((w, h)) = cli.size {
            self.video.width = w;
            self.video.height = h;
        }
        if let Some(fps) = cli.fps {
            self.video.fps = fps;
        }
        if let Some(bitrate) = cli.bitrate {
            self.video.bitrate = bitrate;
        }
        if let Some(dev) = &cli.audio_dev {
            self.audio.device = dev.clone();
        }
        if let Some(sr) = cli.sample_rate {
            self.audio.sample_rate = sr;
        }
        if let Some(ch) = cli.channels {
            self.audio.channels = ch;
        }
        if let Some(ms) = cli.chunk_ms {
            self.audio.period_ms = ms;
        }
        if let Some(sec) = cli.duration_sec {
            self.duration_sec = sec;
        }
        if let Some(out) = &cli.out_h264 {
            self.output.video = out.clone();
        }
        if let Some(out) = &cli.out_pcm {
            self.output.audio = out.clone();
        }
    }

    /// Replace zero rates with defaults and reject what cannot be recorded
    pub fn normalize(&mut self) -> Result<()> {
        if self.video.width == 0 || self.video.height == 0 {
            bail!("invalid size: {}x{}", self.video.width, self.video.height);
        }
        if self.video.device.trim().is_empty() {
            bail!("video device is empty");
        }
        if self.audio.device.trim().is_empty() {
            bail!("audio device is empty");
        }

        if self.video.fps == 0 {
            warn!("[cfg] fps 0 replaced with {}", DEFAULT_FPS);
            self.video.fps = DEFAULT_FPS;
        }
        if self.video.bitrate == 0 {
            self.video.bitrate = DEFAULT_BITRATE;
        }
        if self.audio.sample_rate == 0 {
            self.audio.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        if self.audio.channels == 0 {
            self.audio.channels = DEFAULT_CHANNELS;
        }
        if self.audio.period_ms == 0 {
            self.audio.period_ms = DEFAULT_PERIOD_MS;
        }

        self.video_target()?;
        self.audio_target()?;
        Ok(())
    }

    pub fn video_target(&self) -> Result<SinkTarget> {
        self.output
            .video
            .parse()
            .context("invalid video output target")
    }

    pub fn audio_target(&self) -> Result<SinkTarget> {
        self.output
            .audio
            .parse()
            .context("invalid audio output target")
    }

    pub fn video_session(&self) -> Result<VideoSessionConfig> {
        Ok(VideoSessionConfig {
            device: self.video.device.clone(),
            width: self.video.width,
            height: self.video.height,
            fps: self.video.fps,
            bitrate: self.video.bitrate,
            output: self.video_target()?,
            duration_sec: self.duration_sec,
        })
    }

    pub fn audio_session(&self) -> Result<AudioSessionConfig> {
        Ok(AudioSessionConfig {
            device: self.audio.device.clone(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            period_ms: self.audio.period_ms,
            output: self.audio_target()?,
            duration_sec: self.duration_sec,
        })
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "video={} {}x{}@{} bitrate={} | audio={} {}Hz ch={} period={}ms | out={},{} | sec={}",
            self.video.device,
            self.video.width,
            self.video.height,
            self.video.fps,
            self.video.bitrate,
            self.audio.device,
            self.audio.sample_rate,
            self.audio.channels,
            self.audio.period_ms,
            self.output.video,
            self.output.audio,
            self.duration_sec
        )
    }
}
