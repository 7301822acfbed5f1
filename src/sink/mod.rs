//! Output destinations for a single byte stream.
//!
//! Every variant shares the `Sink` contract: a write either persists all of
//! the requested bytes or fails. Variants are selected once, when the target
//! string is parsed, never switched on inside `write`.

mod file;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use tracing::warn;

pub use file::{DiscardSink, FileSink};

/// Where one stream's bytes are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Raw elementary stream written to a file
    File(PathBuf),
    /// Bytes are accepted and thrown away
    Discard,
    /// Reserved for piping into an external muxer/streamer; not implemented
    Pipe(String),
}

impl FromStr for SinkTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty output target");
        }

        if let Some(command) = s.strip_prefix("pipe:") {
            return Ok(SinkTarget::Pipe(command.to_string()));
        }
        if s == "null" || s == "none" {
            return Ok(SinkTarget::Discard);
        }

        let path = s.strip_prefix("file:").unwrap_or(s);
        if path.is_empty() {
            bail!("file target has no path: {}", s);
        }
        Ok(SinkTarget::File(PathBuf::from(path)))
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::File(path) => write!(f, "{}", path.display()),
            SinkTarget::Discard => f.write_str("null"),
            SinkTarget::Pipe(command) => write!(f, "pipe:{}", command),
        }
    }
}

/// An open output target.
///
/// Owned by exactly one worker; never shared across threads.
pub trait Sink {
    /// Persist all of `data` or fail. A short write is an error.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release the target
    fn close(&mut self) -> Result<()>;

    /// Human-readable target for logging
    fn describe(&self) -> String;
}

/// Open the sink variant named by `target`
pub fn open_sink(target: &SinkTarget) -> Result<Box<dyn Sink>> {
    match target {
        SinkTarget::File(path) => Ok(Box::new(FileSink::create(path)?)),
        SinkTarget::Discard => Ok(Box::new(DiscardSink::default())),
        SinkTarget::Pipe(command) => {
            warn!("[sink] pipe sink not implemented yet: {}", command);
            bail!("pipe sink is not implemented (target pipe:{})", command)
        }
    }
}
