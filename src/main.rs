use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use edge_recorder::session::{shutdown_signal, Recorder, StopReason};
use edge_recorder::{Cli, Config, SystemBackend};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Configuration problems stop us before any device is touched.
    let cfg = match Config::load(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("[cfg] {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[main] {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!("[cfg] {}", cfg);

    let recorder = Recorder::new(
        cfg.video_session()?,
        cfg.audio_session()?,
        cfg.duration_sec,
        Arc::new(SystemBackend),
    );

    let control = recorder.control();
    let signals = tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => control.stop(StopReason::Signal),
            Err(e) => error!("[main] signal handling unavailable: {:#}", e),
        }
    });

    let summary = recorder.run().await;
    signals.abort();
    let summary = summary?;

    info!(
        "[main] done. video={} audio={} frames={} chunks={} encoded={} bytes dropped={}",
        cfg.output.video,
        cfg.output.audio,
        summary.totals.video_frames,
        summary.totals.audio_chunks,
        summary.totals.encoded_bytes,
        summary.totals.dropped
    );

    Ok(())
}
