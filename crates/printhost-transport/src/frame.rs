//! Block framing and resynchronization
//!
//! Reassembles the MCU's raw byte stream into validated protocol
//! blocks. A block is a span between two sync-marker bytes that the
//! codec accepts as structurally valid. The reader owns a fixed
//! scratch buffer of `2 * (MAX_BLOCK_SIZE + 1)` bytes and guarantees
//! forward progress under sustained corruption: every pass either
//! extracts a block, reads more input, or discards at least one byte.

use printhost_core::{Result, TransportError};

use crate::device::Device;

/// Largest block the wire protocol permits, markers included
pub const MAX_BLOCK_SIZE: usize = 192;

/// Validates candidate block spans
///
/// The frame reader only locates marker-delimited candidates; checksum
/// and length validation belong to the codec.
pub trait Codec: Send + Sync {
    /// The reserved byte value delimiting blocks on the wire
    fn sync_byte(&self) -> u8;

    /// Validate a candidate span (both ends are marker bytes)
    ///
    /// Returns the block's declared payload size if the span is a
    /// structurally valid block, `None` otherwise.
    fn validate(&self, span: &[u8]) -> Option<usize>;
}

/// Extracts validated blocks from one device's byte stream
///
/// The scratch buffer is owned exclusively by one device/reader pair
/// and is never shared across threads.
pub struct FrameReader {
    device: Box<dyn Device>,
    codec: Box<dyn Codec>,
    buf: Box<[u8]>,
    len: usize,
}

impl FrameReader {
    /// Create a reader over `device` using `codec` for validation
    pub fn new(device: Box<dyn Device>, codec: Box<dyn Codec>) -> Self {
        Self {
            device,
            codec,
            buf: vec![0u8; 2 * (MAX_BLOCK_SIZE + 1)].into_boxed_slice(),
            len: 0,
        }
    }

    /// Read the next validated block
    ///
    /// Copies the full marker-delimited span into `out` (which must
    /// hold at least [`Self::buffer_capacity`] bytes) and returns the
    /// block's declared payload size. Returns
    /// [`TransportError::EndOfStream`] when the device returns zero
    /// bytes. Corrupt input is never surfaced as an error; it is
    /// discarded during resynchronization.
    pub fn read_block(&mut self, out: &mut [u8]) -> Result<usize> {
        loop {
            if self.len > 0 {
                if let Some((start, end, size)) = self.find_block() {
                    let span = end - start + 1;
                    out[..span].copy_from_slice(&self.buf[start..=end]);
                    self.consume(end + 1);
                    return Ok(size);
                }
            }
            if self.len < self.buf.len() {
                let n = self.device.read(&mut self.buf[self.len..])?;
                if n == 0 {
                    return Err(TransportError::EndOfStream.into());
                }
                self.len += n;
            } else {
                self.resync();
            }
        }
    }

    /// Bytes the caller must provide to `read_block`
    pub fn buffer_capacity(&self) -> usize {
        self.buf.len()
    }

    /// Count of unconsumed bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// The underlying device, for writes
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Locate the earliest-starting, shortest validating block
    ///
    /// Candidate spans are tried in order of increasing start position,
    /// then increasing length; the first span the codec accepts wins.
    /// This iteration order is a protocol invariant: it decides which
    /// block is extracted when a marker byte appears inside payload
    /// data.
    fn find_block(&self) -> Option<(usize, usize, usize)> {
        let sync = self.codec.sync_byte();
        let markers: Vec<usize> = self.buf[..self.len]
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == sync)
            .map(|(i, _)| i)
            .collect();

        for (n, &start) in markers.iter().enumerate() {
            for &end in &markers[n + 1..] {
                if let Some(size) = self.codec.validate(&self.buf[start..=end]) {
                    return Some((start, end, size));
                }
            }
        }
        None
    }

    /// Discard the first `count` buffered bytes
    fn consume(&mut self, count: usize) {
        self.buf.copy_within(count..self.len, 0);
        self.len -= count;
    }

    /// Recover from a full buffer with no valid block
    ///
    /// Discards everything up to and including the first marker byte,
    /// or the whole buffer if no marker is present. Bounds memory and
    /// guarantees forward progress on garbage input.
    fn resync(&mut self) {
        let sync = self.codec.sync_byte();
        match self.buf[..self.len].iter().position(|&b| b == sync) {
            Some(pos) => {
                tracing::debug!("Frame desync, discarding {} bytes", pos + 1);
                self.consume(pos + 1);
            }
            None => {
                tracing::debug!("Frame desync, discarding {} bytes", self.len);
                self.len = 0;
            }
        }
    }
}
