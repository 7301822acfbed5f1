use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, info_span, Instrument};

use super::audio::AudioWorker;
use super::config::{AudioSessionConfig, VideoSessionConfig};
use super::control::{RunControl, StopReason};
use super::report::RunSummary;
use super::video::VideoWorker;
use crate::backend::Backend;

/// Interval between stats lines
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Top-level orchestrator: runs the video worker, the audio worker, the
/// stats reporter and the optional duration timer against one `RunControl`.
pub struct Recorder {
    video: VideoSessionConfig,
    audio: AudioSessionConfig,
    duration: Option<Duration>,
    control: RunControl,
    backend: Arc<dyn Backend>,
    report_interval: Duration,
}

impl Recorder {
    pub fn new(
        video: VideoSessionConfig,
        audio: AudioSessionConfig,
        duration_sec: u32,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let duration = (duration_sec > 0).then(|| Duration::from_secs(u64::from(duration_sec)));
        Self {
            video,
            audio,
            duration,
            control: RunControl::new(),
            backend,
            report_interval: REPORT_INTERVAL,
        }
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Handle for stopping the run from outside (signal handlers, tests)
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Run until both workers have returned, then join the reporter and timer.
    ///
    /// When the audio worker returns, for whatever reason, the stop signal is
    /// forced so the video worker winds down too. The reverse does not hold:
    /// video finishing first leaves audio running to its own limit or stop.
    pub async fn run(self) -> Result<RunSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", id = %run_id);
        let started_at = Utc::now();
        let control = self.control;

        let reporter = tokio::spawn(
            report_loop(control.clone(), self.report_interval).instrument(span.clone()),
        );
        let timer = self
            .duration
            .map(|d| tokio::spawn(stop_after(control.clone(), d).instrument(span.clone())));

        let video = {
            let worker = VideoWorker::new(self.video, control.clone(), Arc::clone(&self.backend));
            let span = span.clone();
            tokio::task::spawn_blocking(move || span.in_scope(|| worker.run()))
        };
        let audio = {
            let worker = AudioWorker::new(self.audio, control.clone(), Arc::clone(&self.backend));
            let span = span.clone();
            tokio::task::spawn_blocking(move || span.in_scope(|| worker.run()))
        };

        let audio = audio.await;
        control.stop(StopReason::AudioFinished);
        let video = video.await;

        let reporter = reporter.await;
        let timer = match timer {
            Some(timer) => timer.await,
            None => Ok(()),
        };

        let audio = audio.context("audio worker panicked")?;
        let video = video.context("video worker panicked")?;
        reporter.context("stats reporter panicked")?;
        timer.context("duration timer panicked")?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            video,
            audio,
            totals: control.stats().totals(),
            stop_reason: control.stop_reason(),
        };

        span.in_scope(|| {
            info!(
                "[main] run finished in {:.1}s: video {} frames / {} bytes ({}), audio {} chunks / {} bytes ({}), dropped={}",
                summary.duration_secs(),
                summary.video.units,
                summary.video.bytes,
                summary.video.exit,
                summary.audio.units,
                summary.audio.bytes,
                summary.audio.exit,
                summary.totals.dropped
            )
        });

        Ok(summary)
    }
}

/// Log one stats line per interval until the stop signal is set
pub async fn report_loop(control: RunControl, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = control.stopped() => break,
            _ = ticker.tick() => {
                let snapshot = control.stats().snapshot_and_reset();
                info!("[stats] {}", snapshot);
            }
        }
    }
}

/// Single-shot duration timer: sets the stop signal once when `duration`
/// elapses, or returns early if something else stopped the run first.
pub async fn stop_after(control: RunControl, duration: Duration) {
    tokio::select! {
        _ = control.stopped() => {}
        _ = tokio::time::sleep(duration) => {
            info!("[timer] {}s elapsed", duration.as_secs());
            control.stop(StopReason::Timer);
        }
    }
}
