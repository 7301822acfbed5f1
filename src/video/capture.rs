use std::io;

use anyhow::Result;

/// One dequeued capture buffer.
///
/// Borrowed from the source: it stays valid until the caller hands the index
/// back with [`VideoSource::enqueue`].
#[derive(Debug)]
pub struct RawBuffer<'a> {
    /// Slot in the device's buffer pool
    pub index: usize,
    /// Monotonic per-frame counter assigned by the driver
    pub sequence: u32,
    /// Frame payload (NV12)
    pub data: &'a [u8],
}

/// A buffer-queue video capture device.
///
/// The worker that opens a source is the only one that ever touches it.
/// Every buffer returned by `dequeue` must be passed back to `enqueue`
/// exactly once, even when the rest of the pipeline failed, or the
/// device runs out of buffers and capture stalls.
pub trait VideoSource {
    /// Start streaming
    fn start(&mut self) -> Result<()>;

    /// Non-blocking dequeue. `Ok(None)` means no frame is ready yet.
    fn dequeue(&mut self) -> Result<Option<RawBuffer<'_>>>;

    /// Return a buffer to the device
    fn enqueue(&mut self, index: usize) -> Result<()>;

    /// Stop streaming and release the device
    fn close(&mut self) -> Result<()>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Detects frames lost upstream from jumps in the capture sequence number
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    last: Option<u32>,
    lost: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next sequence number; returns how many frames were skipped
    /// since the previous one. A restart or wrap (a number not greater than
    /// the last) counts as no loss.
    pub fn observe(&mut self, sequence: u32) -> u64 {
        let gap = match self.last {
            Some(last) if u64::from(sequence) > u64::from(last) + 1 => {
                u64::from(sequence) - u64::from(last) - 1
            }
            _ => 0,
        };

        self.last = Some(sequence);
        self.lost += gap;
        gap
    }

    /// Total frames reported lost so far
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

/// Stable slot numbers for capture buffers identified by their address
#[derive(Debug, Default, Clone)]
pub struct BufferSlots {
    addrs: Vec<usize>,
}

impl BufferSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for the buffer at `addr`; a new address gets the next free slot
    pub fn slot_for(&mut self, addr: usize) -> usize {
        match self.addrs.iter().position(|&a| a == addr) {
            Some(slot) => slot,
            None => {
                self.addrs.push(addr);
                self.addrs.len() - 1
            }
        }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Interpret a readiness poll on a capture fd.
///
/// Only this step may report "nothing yet": it runs before any buffer is
/// handed back, so a miss leaves the driver queue untouched. An interrupted
/// poll is a miss as well.
pub fn frame_ready(poll: io::Result<i32>) -> Result<bool> {
    match poll {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(e.into()),
    }
}
