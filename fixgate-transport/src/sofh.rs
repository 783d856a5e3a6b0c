/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tokio codec for Simple Open Framing Header framing.

use crate::codec::{CodecError, DEFAULT_MAX_MESSAGE_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use fixgate_binary::layout::{ENCODING_TYPE, SOFH_LEN, encoding_type, frame_length};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Splits a byte stream into SOFH-delimited binary frames.
///
/// Yielded frames include the SOFH.
#[derive(Debug, Clone)]
pub struct SofhCodec {
    max_message_size: usize,
}

impl SofhCodec {
    /// Creates a codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

impl Default for SofhCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SofhCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (Some(length), Some(encoding)) = (frame_length(src), encoding_type(src)) else {
            return Ok(None);
        };
        if encoding != ENCODING_TYPE {
            return Err(CodecError::EncodingType(encoding));
        }
        if length < SOFH_LEN {
            return Err(CodecError::InvalidFrameLength(length));
        }
        if length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: length,
                max_size: self.max_message_size,
            });
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        debug!(length, "sofh frame");
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<&[u8]> for SofhCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<Bytes> for SofhCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
