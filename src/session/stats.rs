use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Process-wide throughput and loss counters.
///
/// Producers (the video and audio workers) only touch atomics, so recording
/// never blocks on the reporter. The snapshot window is guarded by a mutex
/// that only the reporter and the final summary take.
#[derive(Debug)]
pub struct Stats {
    video_frames: AtomicU64,
    audio_chunks: AtomicU64,
    encoded_bytes: AtomicU64,
    dropped: AtomicU64,
    window: Mutex<Window>,
}

/// Totals at the start of the current rate window
#[derive(Debug)]
struct Window {
    started: Instant,
    last: StatsTotals,
}

/// Running totals since the process started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsTotals {
    pub video_frames: u64,
    pub audio_chunks: u64,
    pub encoded_bytes: u64,
    pub dropped: u64,
}

/// Deltas accumulated since the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    /// Frames encoded in this window
    pub video_frames: u64,
    /// Audio chunks written in this window
    pub audio_chunks: u64,
    /// Encoded bytes written in this window
    pub encoded_bytes: u64,
    /// Units dropped in this window
    pub dropped: u64,
    /// Length of the window
    pub elapsed: Duration,
    /// Totals at the end of the window
    pub totals: StatsTotals,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            video_frames: AtomicU64::new(0),
            audio_chunks: AtomicU64::new(0),
            encoded_bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            window: Mutex::new(Window {
                started: Instant::now(),
                last: StatsTotals::default(),
            }),
        }
    }

    pub fn record_video_frame(&self) {
        self.video_frames.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_audio_chunk(&self) {
        self.audio_chunks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_encoded_bytes(&self, n: u64) {
        self.encoded_bytes.fetch_add(n, Ordering::SeqCst);
    }

    pub fn record_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::SeqCst);
    }

    pub fn totals(&self) -> StatsTotals {
        StatsTotals {
            video_frames: self.video_frames.load(Ordering::SeqCst),
            audio_chunks: self.audio_chunks.load(Ordering::SeqCst),
            encoded_bytes: self.encoded_bytes.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    /// Close the current rate window and return what happened inside it.
    ///
    /// The underlying counters are never decremented; "reset" only moves the
    /// window start forward.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        // A poisoned window only means a reporter panicked mid-update; the
        // totals it holds are still valid.
        let mut window = self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Read under the lock: totals taken before it could be older than
        // the window another caller just closed.
        let totals = self.totals();
        let now = Instant::now();

        let snapshot = StatsSnapshot {
            video_frames: totals.video_frames - window.last.video_frames,
            audio_chunks: totals.audio_chunks - window.last.audio_chunks,
            encoded_bytes: totals.encoded_bytes - window.last.encoded_bytes,
            dropped: totals.dropped - window.last.dropped,
            elapsed: now.duration_since(window.started),
            totals,
        };

        window.started = now;
        window.last = totals;

        snapshot
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    fn per_second(&self, value: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            value as f64 / secs
        } else {
            0.0
        }
    }

    pub fn video_fps(&self) -> f64 {
        self.per_second(self.video_frames)
    }

    pub fn audio_chunks_per_sec(&self) -> f64 {
        self.per_second(self.audio_chunks)
    }

    pub fn encoded_kbps(&self) -> f64 {
        self.per_second(self.encoded_bytes) * 8.0 / 1000.0
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "video {:.1} fps | audio {:.1} chunk/s | enc {:.1} kbps | drop +{} | total v={} a={} bytes={} drop={}",
            self.video_fps(),
            self.audio_chunks_per_sec(),
            self.encoded_kbps(),
            self.dropped,
            self.totals.video_frames,
            self.totals.audio_chunks,
            self.totals.encoded_bytes,
            self.totals.dropped,
        )
    }
}
