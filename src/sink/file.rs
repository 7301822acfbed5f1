use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use super::Sink;

/// Writes a raw byte stream to a file (or any `Write`)
pub struct FileSink<W: Write = BufWriter<File>> {
    writer: Option<W>,
    label: String,
    bytes_written: u64,
}

impl FileSink {
    /// Create (truncate) the file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        info!("[sink] file sink opened: {}", path.display());

        Ok(Self::from_writer(
            BufWriter::new(file),
            path.display().to_string(),
        ))
    }
}

impl<W: Write> FileSink<W> {
    pub fn from_writer(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            label: label.into(),
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write> Sink for FileSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("sink {} is closed", self.label);
        };
        if data.is_empty() {
            return Ok(());
        }

        // One write call; anything short of the full length is a failure,
        // not a reason to loop and hide a full disk.
        let written = loop {
            match writer.write(data) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to write to {}", self.label))
                }
            }
        };

        if written != data.len() {
            warn!("[sink] partial write: {}/{} to {}", written, data.len(), self.label);
            bail!("partial write: {}/{} bytes to {}", written, data.len(), self.label);
        }

        self.bytes_written += written as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.label))?;
            info!(
                "[sink] closed {} ({} bytes)",
                self.label, self.bytes_written
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<W: Write> Drop for FileSink<W> {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("[sink] failed to flush {} on drop: {}", self.label, e);
            }
        }
    }
}

/// Accepts every byte and keeps none
#[derive(Debug, Default)]
pub struct DiscardSink {
    bytes_discarded: u64,
}

impl Sink for DiscardSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.bytes_discarded += data.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!("[sink] discard sink closed ({} bytes dropped)", self.bytes_discarded);
        Ok(())
    }

    fn describe(&self) -> String {
        "null".to_string()
    }
}
