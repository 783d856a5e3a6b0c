/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Single scratch buffer for outbound frames.
//!
//! A proxy owns exactly one [`FrameBuffer`]. Building a frame overwrites the
//! previous one; the returned slice borrows the buffer, so a second build
//! cannot start while the first frame is still in use.

use bytes::BytesMut;
use fixgate_core::error::EncodeError;
use std::ops::Range;

/// Reusable encode buffer holding the most recent frame.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    frame: Range<usize>,
}

impl FrameBuffer {
    /// Creates a buffer with the given initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            frame: 0..0,
        }
    }

    /// Builds a new frame.
    ///
    /// `encode` writes into the buffer and returns the range of the finished
    /// frame within it.
    ///
    /// # Errors
    /// Returns the encoder's error; the previous frame is discarded either way.
    pub fn build<F>(&mut self, encode: F) -> Result<&[u8], EncodeError>
    where
        F: FnOnce(&mut BytesMut) -> Result<Range<usize>, EncodeError>,
    {
        self.frame = 0..0;
        let range = encode(&mut self.buf)?;
        if range.end > self.buf.len() || range.start > range.end {
            return Err(EncodeError::BufferOverflow {
                needed: range.end,
                available: self.buf.len(),
            });
        }
        self.frame = range;
        Ok(&self.buf[self.frame.clone()])
    }

    /// Returns the most recently built frame.
    #[must_use]
    pub fn last_frame(&self) -> &[u8] {
        &self.buf[self.frame.clone()]
    }

    /// Returns the most recent frame mutably, for in-place patching.
    pub fn last_frame_mut(&mut self) -> &mut [u8] {
        let range = self.frame.clone();
        &mut self.buf[range]
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_build_overwrites_previous_frame() {
        let mut buffer = FrameBuffer::default();
        let first = buffer
            .build(|buf| {
                buf.clear();
                buf.put_slice(b"xxfirst");
                Ok(2..buf.len())
            })
            .unwrap()
            .to_vec();
        assert_eq!(first, b"first");

        buffer
            .build(|buf| {
                buf.clear();
                buf.put_slice(b"second");
                Ok(0..buf.len())
            })
            .unwrap();
        assert_eq!(buffer.last_frame(), b"second");
    }

    #[test]
    fn test_failed_build_clears_frame() {
        let mut buffer = FrameBuffer::default();
        let result = buffer.build(|_| {
            Err(EncodeError::BufferOverflow {
                needed: 10,
                available: 0,
            })
        });
        assert!(result.is_err());
        assert!(buffer.last_frame().is_empty());
    }

    #[test]
    fn test_out_of_bounds_range_is_rejected() {
        let mut buffer = FrameBuffer::default();
        let result = buffer.build(|buf| {
            buf.clear();
            Ok(0..5)
        });
        assert!(result.is_err());
    }
}
