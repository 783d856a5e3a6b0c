/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! FIX message encoder over a caller-owned scratch buffer.
//!
//! The encoder clears the buffer, leaves [`HEADER_RESERVE`] bytes free at the
//! front and appends body fields after them. [`Encoder::finish`] writes
//! `8=..|9=..|` right-aligned into the reserve and appends the checksum, so the
//! finished frame is a sub-range of the buffer and nothing is copied.

use crate::checksum::{calculate_checksum, format_checksum};
use crate::decoder::{EQUALS, SOH};
use bytes::{BufMut, BytesMut};
use fixgate_core::error::EncodeError;
use fixgate_core::types::Timestamp;
use smallvec::SmallVec;
use std::ops::Range;

/// Bytes reserved ahead of the body for BeginString and BodyLength.
pub const HEADER_RESERVE: usize = 32;

/// FIX message encoder.
///
/// Borrows the scratch buffer mutably for its whole lifetime, so only one
/// frame can be under construction per buffer.
#[derive(Debug)]
pub struct Encoder<'a> {
    buf: &'a mut BytesMut,
    begin_string: &'a str,
}

impl<'a> Encoder<'a> {
    /// Starts a new frame in `buf`, discarding its previous contents.
    ///
    /// # Arguments
    /// * `buf` - The scratch buffer
    /// * `begin_string` - The FIX version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(buf: &'a mut BytesMut, begin_string: &'a str) -> Self {
        buf.clear();
        buf.resize(HEADER_RESERVE, 0);
        Self { buf, begin_string }
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a field with a signed integer value.
    #[inline]
    pub fn put_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with a boolean value (Y/N).
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a field with a single character value.
    #[inline]
    pub fn put_char(&mut self, tag: u32, value: char) {
        let mut buf = [0u8; 4];
        self.put_raw(tag, value.encode_utf8(&mut buf).as_bytes());
    }

    /// Appends a UTCTimestamp field with millisecond precision.
    #[inline]
    pub fn put_timestamp(&mut self, tag: u32, value: Timestamp) {
        self.put_str(tag, value.format_millis().as_str());
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.buf.put_slice(tag_buf.format(tag).as_bytes());
        self.buf.put_u8(EQUALS);
        self.buf.put_slice(value);
        self.buf.put_u8(SOH);
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.buf.len() - HEADER_RESERVE
    }

    /// Completes the frame.
    ///
    /// # Returns
    /// The range of `buf` holding the finished frame.
    ///
    /// # Errors
    /// Returns `EncodeError::BufferOverflow` if BeginString and BodyLength do
    /// not fit in the header reserve.
    pub fn finish(self) -> Result<Range<usize>, EncodeError> {
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(self.body_len());

        let mut header: SmallVec<[u8; HEADER_RESERVE]> = SmallVec::new();
        header.extend_from_slice(b"8=");
        header.extend_from_slice(self.begin_string.as_bytes());
        header.push(SOH);
        header.extend_from_slice(b"9=");
        header.extend_from_slice(len_str.as_bytes());
        header.push(SOH);

        if header.len() > HEADER_RESERVE {
            return Err(EncodeError::BufferOverflow {
                needed: header.len(),
                available: HEADER_RESERVE,
            });
        }

        let start = HEADER_RESERVE - header.len();
        self.buf[start..HEADER_RESERVE].copy_from_slice(&header);

        let checksum = format_checksum(calculate_checksum(&self.buf[start..]));
        self.buf.put_slice(b"10=");
        self.buf.put_slice(&checksum);
        self.buf.put_u8(SOH);

        Ok(start..self.buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use fixgate_core::message::MsgType;

    #[test]
    fn test_encoder_frame_decodes() {
        let mut buf = BytesMut::new();
        let mut encoder = Encoder::new(&mut buf, "FIX.4.4");
        encoder.put_str(35, "D");
        encoder.put_uint(34, 12);
        encoder.put_str(49, "SENDER");
        encoder.put_char(54, '1');
        encoder.put_bool(43, true);
        let range = encoder.finish().unwrap();

        let frame = &buf[range];
        assert!(frame.starts_with(b"8=FIX.4.4\x019="));
        let msg = Decoder::new(frame).decode().unwrap();
        assert_eq!(msg.msg_type(), &MsgType::NewOrderSingle);
        assert_eq!(msg.get_field_str(49), Some("SENDER"));
        assert_eq!(msg.get_field_str(43), Some("Y"));
        assert_eq!(msg.get_field_str(54), Some("1"));
    }

    #[test]
    fn test_encoder_body_length() {
        let mut buf = BytesMut::new();
        let mut encoder = Encoder::new(&mut buf, "FIX.4.4");
        encoder.put_str(35, "0");
        assert_eq!(encoder.body_len(), 5);
        let range = encoder.finish().unwrap();
        assert!(buf[range].starts_with(b"8=FIX.4.4\x019=5\x0135=0\x0110="));
    }

    #[test]
    fn test_encoder_reuses_buffer() {
        let mut buf = BytesMut::new();
        let mut first = Encoder::new(&mut buf, "FIX.4.4");
        first.put_str(35, "A");
        first.put_uint(108, 30);
        let first_len = first.finish().unwrap().len();

        let mut second = Encoder::new(&mut buf, "FIX.4.4");
        second.put_str(35, "0");
        let range = second.finish().unwrap();
        assert!(range.len() < first_len);
        assert_eq!(buf.len(), range.end);
    }

    #[test]
    fn test_encoder_timestamp() {
        let mut buf = BytesMut::new();
        let mut encoder = Encoder::new(&mut buf, "FIX.4.4");
        encoder.put_str(35, "0");
        encoder.put_timestamp(52, Timestamp::from_millis(1_000));
        let range = encoder.finish().unwrap();
        let text = String::from_utf8_lossy(&buf[range]).into_owned();
        assert!(text.contains("52=19700101-00:00:01.000\x01"));
    }

    #[test]
    fn test_encoder_begin_string_too_long() {
        let mut buf = BytesMut::new();
        let begin = "FIX.4.4-WITH-A-VERY-LONG-SUFFIX";
        let mut encoder = Encoder::new(&mut buf, begin);
        encoder.put_str(35, "0");
        assert!(matches!(
            encoder.finish(),
            Err(EncodeError::BufferOverflow { .. })
        ));
    }
}
