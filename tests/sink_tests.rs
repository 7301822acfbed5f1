// Integration tests for output sinks
//
// These tests verify target parsing and the all-or-nothing write contract.

mod common;

use std::path::PathBuf;

use anyhow::Result;
use common::ShortWriter;
use edge_recorder::sink::{open_sink, DiscardSink, FileSink, Sink, SinkTarget};
use tempfile::TempDir;

#[test]
fn test_target_parsing() -> Result<()> {
    assert_eq!("out.h264".parse::<SinkTarget>()?, SinkTarget::File(PathBuf::from("out.h264")));
    assert_eq!(
        "file:/tmp/a.pcm".parse::<SinkTarget>()?,
        SinkTarget::File(PathBuf::from("/tmp/a.pcm"))
    );
    assert_eq!("null".parse::<SinkTarget>()?, SinkTarget::Discard);
    assert_eq!("none".parse::<SinkTarget>()?, SinkTarget::Discard);
    assert_eq!(
        "pipe:ffmpeg -i - out.mp4".parse::<SinkTarget>()?,
        SinkTarget::Pipe("ffmpeg -i - out.mp4".to_string())
    );

    assert!("".parse::<SinkTarget>().is_err());
    assert!("   ".parse::<SinkTarget>().is_err());
    assert!("file:".parse::<SinkTarget>().is_err());

    Ok(())
}

#[test]
fn test_target_display_round_trips() -> Result<()> {
    for s in ["out.h264", "null", "pipe:cat"] {
        let target: SinkTarget = s.parse()?;
        assert_eq!(target.to_string(), s);
    }
    Ok(())
}

#[test]
fn test_file_sink_writes_all_bytes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("out.pcm");

    let mut sink = open_sink(&SinkTarget::File(path.clone()))?;
    sink.write(&[1, 2, 3])?;
    sink.write(&[])?;
    sink.write(&[4, 5])?;
    sink.close()?;

    assert_eq!(std::fs::read(&path)?, vec![1, 2, 3, 4, 5]);

    Ok(())
}

#[test]
fn test_file_sink_truncates_existing_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("out.h264");
    std::fs::write(&path, b"stale data from an earlier run")?;

    let mut sink = FileSink::create(&path)?;
    sink.write(b"new")?;
    sink.close()?;

    assert_eq!(std::fs::read(&path)?, b"new");
    assert_eq!(sink.bytes_written(), 3);

    Ok(())
}

#[test]
fn test_file_sink_open_failure() {
    let result = FileSink::create("/nonexistent-dir/for-sure/out.h264");
    assert!(result.is_err());
}

#[test]
fn test_partial_write_is_an_error() {
    let mut sink = FileSink::from_writer(ShortWriter { accept: 3 }, "short");

    let err = sink.write(&[0u8; 5]).unwrap_err();
    assert!(format!("{:#}", err).contains("partial write: 3/5"));
    assert_eq!(sink.bytes_written(), 0);

    // A write that fits is fine
    sink.write(&[0u8; 3]).unwrap();
    assert_eq!(sink.bytes_written(), 3);
}

#[test]
fn test_write_after_close_fails() -> Result<()> {
    let mut sink = FileSink::from_writer(Vec::<u8>::new(), "memory");
    sink.write(b"abc")?;
    sink.close()?;
    sink.close()?;

    assert!(sink.write(b"more").is_err());

    Ok(())
}

#[test]
fn test_discard_sink_accepts_everything() -> Result<()> {
    let mut sink = DiscardSink::default();
    sink.write(&[0u8; 4096])?;
    sink.close()?;
    assert_eq!(sink.describe(), "null");

    let mut opened = open_sink(&SinkTarget::Discard)?;
    opened.write(b"anything")?;
    opened.close()?;

    Ok(())
}

#[test]
fn test_pipe_sink_is_not_available() {
    let result = open_sink(&SinkTarget::Pipe("ffmpeg".to_string()));
    assert!(result.is_err());
}
