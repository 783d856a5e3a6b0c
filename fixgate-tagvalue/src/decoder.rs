/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! Field values are returned as references into the input buffer. The decoder
//! checks the framing header (`8`, `9`, `35`) and, unless disabled, the
//! trailing checksum.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixgate_core::error::DecodeError;
use fixgate_core::field::{FieldRef, tags};
use fixgate_core::message::{MsgType, RawMessage};
use memchr::{memchr, memmem};
use smallvec::SmallVec;
use std::ops::Range;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    ///
    /// Archived logons have their passwords masked, which leaves the declared
    /// checksum stale; replay turns validation off for that reason.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes one complete FIX message starting at the current offset.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed, incomplete or
    /// fails checksum validation.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string_field = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string = self.range_of(begin_string_field.value);

        let body_length_field = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let body_length: usize = body_length_field
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let body_start = self.offset;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type: MsgType = match msg_type_field.as_str()?.parse() {
            Ok(msg_type) => msg_type,
            Err(never) => match never {},
        };

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        let mut checksum_field: Option<FieldRef<'a>> = None;
        while let Some(field) = self.next_field() {
            if field.tag == tags::CHECK_SUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        let checksum_ref = checksum_field.ok_or(DecodeError::Incomplete)?;
        if self.validate_checksum {
            let declared =
                parse_checksum(checksum_ref.value).ok_or_else(|| DecodeError::InvalidFieldValue {
                    tag: tags::CHECK_SUM,
                    reason: "invalid checksum format".to_string(),
                })?;

            // "10=" precedes the value
            let checksum_start = self.range_of(checksum_ref.value).start - 3;
            let calculated = calculate_checksum(&self.input[start_offset..checksum_start]);

            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        let body = (body_start - start_offset)..(body_start - start_offset + body_length);
        let begin_string = (begin_string.start - start_offset)..(begin_string.end - start_offset);

        Ok(RawMessage::new(
            &self.input[start_offset..self.offset],
            begin_string,
            body,
            msg_type,
            fields,
        ))
    }

    /// Parses the next field from the buffer.
    ///
    /// # Returns
    /// The next field, or `None` if the buffer is exhausted or malformed.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];
        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;

        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn range_of(&self, value: &[u8]) -> Range<usize> {
        let start = value.as_ptr() as usize - self.input.as_ptr() as usize;
        start..start + value.len()
    }
}

/// Locates the value of the first occurrence of `tag` in a tag=value frame.
///
/// Works on frames that fail full decoding, which is how a reject can still
/// quote the offending MsgSeqNum.
///
/// # Returns
/// The byte range of the value, or `None` if the tag is absent.
#[must_use]
pub fn find_field(input: &[u8], tag: u32) -> Option<Range<usize>> {
    let mut tag_buf = itoa::Buffer::new();
    let tag_str = tag_buf.format(tag).as_bytes();

    let value_start = if input.starts_with(tag_str) && input.get(tag_str.len()) == Some(&EQUALS) {
        tag_str.len() + 1
    } else {
        let mut needle: SmallVec<[u8; 12]> = SmallVec::new();
        needle.push(SOH);
        needle.extend_from_slice(tag_str);
        needle.push(EQUALS);
        memmem::find(input, &needle)? + needle.len()
    };

    let value_len = memchr(SOH, &input[value_start..]).unwrap_or(input.len() - value_start);
    Some(value_start..value_start + value_len)
}

#[inline]
pub(crate) fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::format_checksum;

    fn frame(body: &str) -> Vec<u8> {
        let mut out = format!("8=FIX.4.4\x019={}\x01{}", body.len(), body).into_bytes();
        let checksum = format_checksum(calculate_checksum(&out));
        out.extend_from_slice(b"10=");
        out.extend_from_slice(&checksum);
        out.push(SOH);
        out
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_decode_heartbeat() {
        let input = frame("35=0\x0134=2\x0149=A\x0156=B\x01");
        let mut decoder = Decoder::new(&input);
        let msg = decoder.decode().unwrap();

        assert_eq!(msg.msg_type(), &MsgType::Heartbeat);
        assert_eq!(msg.begin_string(), "FIX.4.4");
        assert_eq!(msg.get_field_as::<u64>(tags::MSG_SEQ_NUM).unwrap(), 2);
        assert_eq!(msg.get_field_str(tags::SENDER_COMP_ID), Some("A"));
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut input = frame("35=0\x0134=2\x01");
        let len = input.len();
        input[len - 2] = if input[len - 2] == b'0' { b'1' } else { b'0' };

        let result = Decoder::new(&input).decode();
        assert!(matches!(result, Err(DecodeError::ChecksumMismatch { .. })));

        let relaxed = Decoder::new(&input).with_checksum_validation(false).decode();
        assert!(relaxed.is_ok());
    }

    #[test]
    fn test_decode_missing_msg_type() {
        let input = frame("34=2\x0135=0\x01");
        let result = Decoder::new(&input).decode();
        assert_eq!(result.unwrap_err(), DecodeError::MissingMsgType);
    }

    #[test]
    fn test_decode_incomplete() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x01";
        assert_eq!(
            Decoder::new(input).decode().unwrap_err(),
            DecodeError::Incomplete
        );
    }

    #[test]
    fn test_find_field() {
        let input = b"8=FIX.4.4\x0134=17\x01134=9\x01";
        let range = find_field(input, 34).unwrap();
        assert_eq!(&input[range], b"17");
        let range = find_field(input, 8).unwrap();
        assert_eq!(&input[range], b"FIX.4.4");
        assert!(find_field(input, 52).is_none());
    }
}
