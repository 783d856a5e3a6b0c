/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tokio codec for tag=value FIX framing.
//!
//! Frames are delimited from BeginString and BodyLength; the CheckSum
//! trailer is expected but, by default, not verified.

use bytes::{BufMut, Bytes, BytesMut};
use fixgate_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Invalid BeginString field.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// Missing BodyLength field.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Checksum mismatch.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum.
        calculated: u8,
        /// Declared checksum in message.
        declared: u8,
    },

    /// SOFH encoding type is not the one this codec frames.
    #[error("unsupported sofh encoding type {0:#06x}")]
    EncodingType(u16),

    /// SOFH length shorter than the header itself.
    #[error("invalid frame length {0}")]
    InvalidFrameLength(usize),

    /// Message exceeds maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

const SOH: u8 = 0x01;

/// Length of the `10=XXX|` trailer.
const TRAILER_LEN: usize = 7;

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Tokio codec for tag=value FIX framing.
#[derive(Debug, Clone)]
pub struct FixCodec {
    max_message_size: usize,
    validate_checksum: bool,
}

impl FixCodec {
    /// Creates a framing-only codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            validate_checksum: false,
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Makes the codec fail the stream on a checksum mismatch.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        if &src[0..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }

        let Some(first_soh) = memchr(SOH, src) else {
            return Ok(None);
        };

        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 2 {
            return Ok(None);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }

        let Some(body_len_soh) = memchr(SOH, &src[body_len_start..]).map(|pos| body_len_start + pos)
        else {
            return Ok(None);
        };

        let body_length: usize = std::str::from_utf8(&src[body_len_start + 2..body_len_soh])
            .map_err(|_| CodecError::InvalidBodyLength)?
            .parse()
            .map_err(|_| CodecError::InvalidBodyLength)?;

        // BodyLength counts from after `9=N|` up to `10=`.
        let total_length = body_len_soh + 1 + body_length + TRAILER_LEN;
        if total_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: total_length,
                max_size: self.max_message_size,
            });
        }
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        if self.validate_checksum {
            let checksum_start = total_length - 4;
            let declared = parse_checksum(&src[checksum_start..checksum_start + 3])
                .ok_or(CodecError::InvalidBodyLength)?;
            let calculated = calculate_checksum(&src[..total_length - TRAILER_LEN]);
            if calculated != declared {
                return Err(CodecError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        Ok(Some(src.split_to(total_length)))
    }
}

impl Encoder<&[u8]> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fix_message(body: &str) -> Vec<u8> {
        let header = format!("8=FIX.4.4\x019={}\x01", body.len());
        let without_checksum = format!("{}{}", header, body);
        let checksum = calculate_checksum(without_checksum.as_bytes());
        format!("{}10={:03}\x01", without_checksum, checksum).into_bytes()
    }

    #[test]
    fn test_codec_decode_complete_message() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x0134=1\x01");
        let mut buf = BytesMut::from(&msg[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &msg[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_splits_back_to_back_frames() {
        let mut codec = FixCodec::new();
        let first = make_fix_message("35=0\x0134=1\x01");
        let second = make_fix_message("35=1\x0134=2\x01112=ABC\x01");
        let mut buf = BytesMut::new();
        buf.put_slice(&first);
        buf.put_slice(&second);

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], &first[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], &second[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_decode_incomplete() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&msg[..msg.len() - 5]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.put_slice(&msg[msg.len() - 5..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_codec_decode_invalid_begin_string() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"9=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidBeginString)));
    }

    #[test]
    fn test_bad_checksum_is_framed_by_default() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());

        let mut strict = FixCodec::new().with_checksum_validation(true);
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);
        assert!(matches!(
            strict.decode(&mut buf),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_codec_rejects_oversized_frame() {
        let mut codec = FixCodec::new().with_max_message_size(16);
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&msg[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_codec_encode() {
        let mut codec = FixCodec::new();
        let msg = b"8=FIX.4.4\x019=5\x0135=0\x0110=123\x01";
        let mut dst = BytesMut::new();

        codec.encode(&msg[..], &mut dst).unwrap();
        codec.encode(Bytes::from_static(msg), &mut dst).unwrap();
        assert_eq!(&dst[..msg.len()], msg);
        assert_eq!(dst.len(), msg.len() * 2);
    }
}
