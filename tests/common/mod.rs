// Scripted stand-ins for capture devices, the encoder and sinks.
//
// Every double reports what happened to it through a shared `Tally`, so
// tests can check buffer hand-back, teardown order and written bytes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use edge_recorder::audio::{AudioFormat, AudioSource};
use edge_recorder::backend::Backend;
use edge_recorder::encoder::{EncodedPacket, EncoderSettings, VideoEncoder};
use edge_recorder::session::{AudioSessionConfig, VideoSessionConfig};
use edge_recorder::sink::{FileSink, Sink, SinkTarget};
use edge_recorder::video::{RawBuffer, VideoSource};

pub const VIDEO_OUT: &str = "video.h264";
pub const AUDIO_OUT: &str = "audio.pcm";

#[derive(Default)]
pub struct Tally {
    pub video_started: AtomicBool,
    pub dequeued: AtomicU64,
    pub enqueued: AtomicU64,
    pub bad_enqueues: AtomicU64,
    pub encoded: AtomicU64,
    pub audio_started: AtomicBool,
    pub audio_reads: AtomicU64,
    pub closed: Mutex<Vec<String>>,
    pub written: Mutex<HashMap<String, Vec<u8>>>,
}

impl Tally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    pub fn written(&self, target: &str) -> Vec<u8> {
        self.written
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    fn close(&self, what: &str) {
        self.closed.lock().unwrap().push(what.to_string());
    }
}

// ---------------------------------------------------------------- video

#[derive(Debug, Clone, Copy)]
pub enum VideoStep {
    Frame(u32),
    WouldBlock,
    Fail,
}

/// What the source does once its steps run out
#[derive(Debug, Clone, Copy)]
pub enum VideoThen {
    /// WouldBlock forever
    Idle,
    /// Keep producing frames with contiguous sequence numbers
    Continuous,
}

#[derive(Debug, Clone)]
pub struct VideoScript {
    pub steps: VecDeque<VideoStep>,
    pub then: VideoThen,
    pub payload: Vec<u8>,
}

impl VideoScript {
    pub fn frames(sequences: impl IntoIterator<Item = u32>) -> Self {
        Self {
            steps: sequences.into_iter().map(VideoStep::Frame).collect(),
            then: VideoThen::Idle,
            payload: vec![0x80; 64],
        }
    }

    pub fn steps(steps: impl IntoIterator<Item = VideoStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            then: VideoThen::Idle,
            payload: vec![0x80; 64],
        }
    }

    pub fn continuous() -> Self {
        Self {
            steps: VecDeque::new(),
            then: VideoThen::Continuous,
            payload: vec![0x80; 64],
        }
    }

    pub fn idle() -> Self {
        Self::steps([])
    }
}

const POOL: usize = 4;

pub struct ScriptedVideoSource {
    script: VideoScript,
    tally: Arc<Tally>,
    next_index: usize,
    held: Vec<bool>,
    last_sequence: u32,
    started: bool,
}

impl VideoSource for ScriptedVideoSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.tally.video_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<Option<RawBuffer<'_>>> {
        if !self.started {
            bail!("dequeue before start");
        }

        let step = match self.script.steps.pop_front() {
            Some(step) => step,
            None => match self.script.then {
                VideoThen::Idle => VideoStep::WouldBlock,
                VideoThen::Continuous => VideoStep::Frame(self.last_sequence.wrapping_add(1)),
            },
        };

        match step {
            VideoStep::WouldBlock => Ok(None),
            VideoStep::Fail => bail!("device unplugged"),
            VideoStep::Frame(sequence) => {
                let index = self.next_index;
                if self.held[index] {
                    bail!("buffer pool exhausted");
                }
                self.held[index] = true;
                self.next_index = (self.next_index + 1) % POOL;
                self.last_sequence = sequence;
                self.tally.dequeued.fetch_add(1, Ordering::SeqCst);
                Ok(Some(RawBuffer {
                    index,
                    sequence,
                    data: &self.script.payload,
                }))
            }
        }
    }

    fn enqueue(&mut self, index: usize) -> Result<()> {
        if index >= POOL || !self.held[index] {
            self.tally.bad_enqueues.fetch_add(1, Ordering::SeqCst);
            bail!("buffer {} was not dequeued", index);
        }
        self.held[index] = false;
        self.tally.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tally.close("capture");
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted-video"
    }
}

#[derive(Debug, Clone, Copy)]
pub enum EncoderMode {
    /// One packet of this many bytes per frame
    PacketPerFrame(usize),
    /// No packet for the first `held` frames, then one packet per frame
    Lookahead { held: u64, len: usize },
    /// Fail on this (1-based) frame
    FailOn(u64),
}

pub struct ScriptedEncoder {
    mode: EncoderMode,
    frames: u64,
    tally: Arc<Tally>,
}

impl VideoEncoder for ScriptedEncoder {
    fn encode(&mut self, frame: &[u8]) -> Result<Option<EncodedPacket>> {
        if frame.is_empty() {
            bail!("empty frame");
        }
        self.frames += 1;
        self.tally.encoded.fetch_add(1, Ordering::SeqCst);

        match self.mode {
            EncoderMode::PacketPerFrame(len) => Ok(Some(EncodedPacket::new(vec![0xAB; len], false))),
            EncoderMode::Lookahead { held, len } => {
                if self.frames <= held {
                    Ok(None)
                } else {
                    Ok(Some(EncodedPacket::new(vec![0xCD; len], false)))
                }
            }
            EncoderMode::FailOn(n) if self.frames == n => bail!("encoder rejected frame"),
            EncoderMode::FailOn(_) => Ok(Some(EncodedPacket::new(vec![0xEF; 10], false))),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.tally.close("encoder");
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted-encoder"
    }
}

// ---------------------------------------------------------------- audio

#[derive(Debug, Clone, Copy)]
pub enum AudioStep {
    Data(usize),
    NoData,
    Fail,
}

#[derive(Debug, Clone, Copy)]
pub enum AudioThen {
    /// Return no data forever
    Idle,
    /// Fill every read completely
    Continuous,
}

#[derive(Debug, Clone)]
pub struct AudioScript {
    pub format: AudioFormat,
    pub steps: VecDeque<AudioStep>,
    pub then: AudioThen,
}

impl AudioScript {
    pub fn continuous(format: AudioFormat) -> Self {
        Self {
            format,
            steps: VecDeque::new(),
            then: AudioThen::Continuous,
        }
    }

    pub fn idle(format: AudioFormat) -> Self {
        Self {
            format,
            steps: VecDeque::new(),
            then: AudioThen::Idle,
        }
    }

    pub fn steps(format: AudioFormat, steps: impl IntoIterator<Item = AudioStep>) -> Self {
        Self {
            format,
            steps: steps.into_iter().collect(),
            then: AudioThen::Idle,
        }
    }
}

pub struct ScriptedAudioSource {
    script: AudioScript,
    tally: Arc<Tally>,
    counter: u8,
    fail_start: bool,
}

impl AudioSource for ScriptedAudioSource {
    fn format(&self) -> AudioFormat {
        self.script.format
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            bail!("device busy");
        }
        self.tally.audio_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.tally.audio_started.load(Ordering::SeqCst) {
            bail!("read before start");
        }
        self.tally.audio_reads.fetch_add(1, Ordering::SeqCst);

        let step = match self.script.steps.pop_front() {
            Some(step) => step,
            None => match self.script.then {
                AudioThen::Idle => AudioStep::NoData,
                AudioThen::Continuous => AudioStep::Data(buf.len()),
            },
        };

        match step {
            AudioStep::NoData => Ok(0),
            AudioStep::Fail => bail!("overrun recovery failed"),
            AudioStep::Data(n) => {
                let n = n.min(buf.len());
                for b in &mut buf[..n] {
                    *b = self.counter;
                    self.counter = self.counter.wrapping_add(1);
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.tally.close("audio-capture");
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted-audio"
    }
}

// ---------------------------------------------------------------- sinks

/// Writer that accepts at most `accept` bytes per call
pub struct ShortWriter {
    pub accept: usize,
}

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len().min(self.accept))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct MemorySink {
    target: String,
    tally: Arc<Tally>,
}

impl Sink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.tally
            .written
            .lock()
            .unwrap()
            .entry(self.target.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tally.close(&format!("sink:{}", self.target));
        Ok(())
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SinkMode {
    Memory,
    Short(usize),
    FailOpen,
}

// ---------------------------------------------------------------- backend

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    VideoSource,
    Encoder,
    AudioSource,
    AudioStart,
}

pub struct MockBackend {
    tally: Arc<Tally>,
    video: Mutex<Option<VideoScript>>,
    encoder: EncoderMode,
    audio: Mutex<Option<AudioScript>>,
    sinks: HashMap<String, SinkMode>,
    failures: Vec<OpenFailure>,
}

impl MockBackend {
    pub fn new(tally: Arc<Tally>) -> Self {
        Self {
            tally,
            video: Mutex::new(Some(VideoScript::idle())),
            encoder: EncoderMode::PacketPerFrame(100),
            audio: Mutex::new(Some(AudioScript::idle(AudioFormat::s16le(48_000, 2, 20)))),
            sinks: HashMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn with_video(self, script: VideoScript) -> Self {
        *self.video.lock().unwrap() = Some(script);
        self
    }

    pub fn with_encoder(mut self, mode: EncoderMode) -> Self {
        self.encoder = mode;
        self
    }

    pub fn with_audio(self, script: AudioScript) -> Self {
        *self.audio.lock().unwrap() = Some(script);
        self
    }

    pub fn with_sink(mut self, target: &str, mode: SinkMode) -> Self {
        self.sinks.insert(target.to_string(), mode);
        self
    }

    pub fn failing(mut self, failure: OpenFailure) -> Self {
        self.failures.push(failure);
        self
    }
}

impl Backend for MockBackend {
    fn open_video_source(&self, _config: &VideoSessionConfig) -> Result<Box<dyn VideoSource>> {
        if self.failures.contains(&OpenFailure::VideoSource) {
            bail!("no such device");
        }
        let script = self.video.lock().unwrap().take().unwrap_or_else(VideoScript::idle);
        Ok(Box::new(ScriptedVideoSource {
            script,
            tally: Arc::clone(&self.tally),
            next_index: 0,
            held: vec![false; POOL],
            last_sequence: 0,
            started: false,
        }))
    }

    fn open_encoder(&self, _settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        if self.failures.contains(&OpenFailure::Encoder) {
            bail!("encoder negotiation rejected");
        }
        Ok(Box::new(ScriptedEncoder {
            mode: self.encoder,
            frames: 0,
            tally: Arc::clone(&self.tally),
        }))
    }

    fn open_audio_source(&self, config: &AudioSessionConfig) -> Result<Box<dyn AudioSource>> {
        if self.failures.contains(&OpenFailure::AudioSource) {
            bail!("no such sound card");
        }
        let script = self
            .audio
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| {
                AudioScript::idle(AudioFormat::s16le(config.sample_rate, config.channels, config.period_ms))
            });
        Ok(Box::new(ScriptedAudioSource {
            script,
            tally: Arc::clone(&self.tally),
            counter: 0,
            fail_start: self.failures.contains(&OpenFailure::AudioStart),
        }))
    }

    fn open_sink(&self, target: &SinkTarget) -> Result<Box<dyn Sink>> {
        let name = target.to_string();
        match self.sinks.get(&name).copied().unwrap_or(SinkMode::Memory) {
            SinkMode::Memory => Ok(Box::new(MemorySink {
                target: name,
                tally: Arc::clone(&self.tally),
            })),
            SinkMode::Short(accept) => Ok(Box::new(FileSink::from_writer(ShortWriter { accept }, name))),
            SinkMode::FailOpen => bail!("permission denied: {}", name),
        }
    }
}

// ---------------------------------------------------------------- configs

pub fn video_config(duration_sec: u32, fps: u32) -> VideoSessionConfig {
    VideoSessionConfig {
        device: "/dev/video0".to_string(),
        width: 64,
        height: 32,
        fps,
        bitrate: 1_000_000,
        output: SinkTarget::File(VIDEO_OUT.into()),
        duration_sec,
    }
}

pub fn audio_config(duration_sec: u32, sample_rate: u32, channels: u16) -> AudioSessionConfig {
    AudioSessionConfig {
        device: "hw:0,0".to_string(),
        sample_rate,
        channels,
        period_ms: 20,
        output: SinkTarget::File(AUDIO_OUT.into()),
        duration_sec,
    }
}

/// Poll `cond` until it holds or `timeout` passes; returns the final result
pub fn wait_until(timeout: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    cond()
}
