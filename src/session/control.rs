use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::stats::Stats;

/// Back-off between retries when a capture source has nothing ready.
pub const BACKOFF: Duration = Duration::from_millis(1);

/// Why the run was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM was delivered
    Signal,
    /// The configured duration elapsed
    Timer,
    /// The audio worker returned (limit reached, stopped or failed)
    AudioFinished,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Signal => "signal",
            StopReason::Timer => "timer",
            StopReason::AudioFinished => "audio finished",
        };
        f.write_str(s)
    }
}

/// Shared run context handed to every worker, the reporter and the timer.
///
/// Cloning is cheap; all clones observe the same stop signal and counters.
/// The stop signal only ever goes from unset to set.
#[derive(Clone)]
pub struct RunControl {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
    stats: Arc<Stats>,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
            stats: Arc::new(Stats::new()),
        }
    }

    /// Request a cooperative stop. Only the first caller's reason is kept.
    pub fn stop(&self, reason: StopReason) {
        if self.reason.set(reason).is_ok() {
            info!("[main] stop requested ({})", reason);
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason recorded by the first `stop` call, if any
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Resolves once the stop signal is set
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
