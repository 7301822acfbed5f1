pub mod capture;

#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use capture::{frame_ready, BufferSlots, RawBuffer, SequenceTracker, VideoSource};

use anyhow::Result;

use crate::session::VideoSessionConfig;

/// Open the platform capture device described by `config`
pub fn open_video_source(config: &VideoSessionConfig) -> Result<Box<dyn VideoSource>> {
    #[cfg(feature = "v4l2")]
    {
        let source = v4l2::V4l2Source::open(config)?;
        Ok(Box::new(source))
    }

    #[cfg(not(feature = "v4l2"))]
    {
        anyhow::bail!(
            "video capture from {} requires the `v4l2` feature",
            config.device
        )
    }
}
