/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Binary frame encoder and zero-copy frame view.

use crate::error::BinaryError;
use crate::layout::{
    BLOCK_OFFSET, COMMON_BLOCK_LEN, ENCODING_TYPE, FIXED_OFFSET, POSS_DUP_OFFSET, SCHEMA_ID,
    SCHEMA_VERSION, SEQ_NUM_OFFSET, SENDING_TIME_OFFSET, SESSION_ID_OFFSET, SOFH_LEN,
    TLV_HEADER_LEN, Template, encoding_type, frame_length, read_u16, read_u32, read_u64,
};
use bytes::{BufMut, BytesMut};
use fixgate_core::error::EncodeError;
use fixgate_session::proxy::BodyWriter;
use std::ops::Range;

/// Fields every template starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommonBlock {
    /// MsgSeqNum.
    pub msg_seq_num: u64,
    /// SendingTime in epoch nanoseconds.
    pub sending_time: u64,
    /// Session id.
    pub session_id: u64,
    /// PossDupFlag.
    pub poss_dup: bool,
}

/// Writes one binary frame into a caller-owned scratch buffer.
///
/// Template fields are appended with the `put_fixed_*` methods; the first TLV
/// closes the root block, zero-padding any fixed fields that were not written.
#[derive(Debug)]
pub struct BinaryEncoder<'a> {
    buf: &'a mut BytesMut,
    block_end: usize,
    error: Option<EncodeError>,
}

impl<'a> BinaryEncoder<'a> {
    /// Starts a frame for `template`, discarding the previous contents of `buf`.
    #[must_use]
    pub fn new(buf: &'a mut BytesMut, template: Template, common: &CommonBlock) -> Self {
        let fixed_len = template.fixed_len();
        buf.clear();
        buf.put_u32(0);
        buf.put_u16(ENCODING_TYPE);
        buf.put_u16_le((COMMON_BLOCK_LEN + fixed_len) as u16);
        buf.put_u16_le(template.id());
        buf.put_u16_le(SCHEMA_ID);
        buf.put_u16_le(SCHEMA_VERSION);
        buf.put_u64_le(common.msg_seq_num);
        buf.put_u64_le(common.sending_time);
        buf.put_u64_le(common.session_id);
        buf.put_u8(u8::from(common.poss_dup));

        Self {
            buf,
            block_end: FIXED_OFFSET + fixed_len,
            error: None,
        }
    }

    /// Appends a one byte template field.
    #[inline]
    pub fn put_fixed_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Appends a four byte template field.
    #[inline]
    pub fn put_fixed_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Appends an eight byte template field.
    #[inline]
    pub fn put_fixed_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Appends a TLV.
    pub fn put_tlv(&mut self, tag: u32, value: &[u8]) {
        self.close_block();
        let Ok(tag16) = u16::try_from(tag) else {
            self.fail(EncodeError::InvalidFieldValue {
                tag,
                reason: "tag does not fit in u16".to_string(),
            });
            return;
        };
        let Ok(len) = u16::try_from(value.len()) else {
            self.fail(EncodeError::FieldTooLong {
                tag,
                length: value.len(),
                max_length: usize::from(u16::MAX),
            });
            return;
        };
        self.buf.put_u16_le(tag16);
        self.buf.put_u16_le(len);
        self.buf.put_slice(value);
    }

    /// Completes the frame by writing the SOFH length.
    ///
    /// # Errors
    /// Returns the first error recorded while appending fields.
    pub fn finish(mut self) -> Result<Range<usize>, EncodeError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.close_block();
        let len = self.buf.len();
        let declared = u32::try_from(len).map_err(|_| EncodeError::BufferOverflow {
            needed: len,
            available: u32::MAX as usize,
        })?;
        self.buf[..4].copy_from_slice(&declared.to_be_bytes());
        Ok(0..len)
    }

    fn close_block(&mut self) {
        if self.buf.len() < self.block_end {
            self.buf.resize(self.block_end, 0);
        }
    }

    fn fail(&mut self, err: EncodeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl BodyWriter for BinaryEncoder<'_> {
    fn put_str(&mut self, tag: u32, value: &str) {
        self.put_tlv(tag, value.as_bytes());
    }

    fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_tlv(tag, buf.format(value).as_bytes());
    }

    fn put_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.put_tlv(tag, buf.format(value).as_bytes());
    }

    fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_tlv(tag, if value { b"Y" } else { b"N" });
    }

    fn put_char(&mut self, tag: u32, value: char) {
        let mut buf = [0u8; 4];
        self.put_tlv(tag, value.encode_utf8(&mut buf).as_bytes());
    }

    fn put_raw(&mut self, tag: u32, value: &[u8]) {
        self.put_tlv(tag, value);
    }
}

/// A TLV inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Field tag.
    pub tag: u16,
    /// Field value.
    pub value: &'a [u8],
    /// Offset of the value within the frame.
    pub offset: usize,
}

impl Tlv<'_> {
    /// Returns the byte range of the value within the frame.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.value.len()
    }
}

/// Validated view over one complete binary frame.
#[derive(Debug, Clone, Copy)]
pub struct BinaryFrame<'a> {
    buf: &'a [u8],
    template: Template,
    tlv_start: usize,
}

impl<'a> BinaryFrame<'a> {
    /// Validates the SOFH, SBE header and root block of `buf`.
    ///
    /// # Errors
    /// Returns `BinaryError` if `buf` is not exactly one well-formed frame.
    pub fn parse(buf: &'a [u8]) -> Result<Self, BinaryError> {
        if buf.len() < FIXED_OFFSET {
            return Err(BinaryError::Truncated {
                needed: FIXED_OFFSET,
                available: buf.len(),
            });
        }
        let declared = frame_length(buf).unwrap_or_default();
        if declared != buf.len() {
            return Err(BinaryError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }
        let encoding = encoding_type(buf).unwrap_or_default();
        if encoding != ENCODING_TYPE {
            return Err(BinaryError::EncodingType(encoding));
        }

        let block_length = read_u16(buf, SOFH_LEN).unwrap_or_default();
        let template_id = read_u16(buf, SOFH_LEN + 2).unwrap_or_default();
        let schema_id = read_u16(buf, SOFH_LEN + 4).unwrap_or_default();
        let version = read_u16(buf, SOFH_LEN + 6).unwrap_or_default();
        if schema_id != SCHEMA_ID || version != SCHEMA_VERSION {
            return Err(BinaryError::Schema { schema_id, version });
        }
        let template =
            Template::from_id(template_id).ok_or(BinaryError::UnknownTemplate(template_id))?;
        if usize::from(block_length) < COMMON_BLOCK_LEN + template.fixed_len() {
            return Err(BinaryError::BlockLength {
                block_length,
                template_id,
            });
        }
        let tlv_start = BLOCK_OFFSET + usize::from(block_length);
        if buf.len() < tlv_start {
            return Err(BinaryError::Truncated {
                needed: tlv_start,
                available: buf.len(),
            });
        }

        Ok(Self {
            buf,
            template,
            tlv_start,
        })
    }

    /// Returns the frame bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Returns the template.
    #[inline]
    #[must_use]
    pub const fn template(&self) -> Template {
        self.template
    }

    /// Returns MsgSeqNum.
    #[must_use]
    pub fn msg_seq_num(&self) -> u64 {
        read_u64(self.buf, SEQ_NUM_OFFSET).unwrap_or_default()
    }

    /// Returns SendingTime in epoch nanoseconds.
    #[must_use]
    pub fn sending_time(&self) -> u64 {
        read_u64(self.buf, SENDING_TIME_OFFSET).unwrap_or_default()
    }

    /// Returns the session id carried in the frame.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        read_u64(self.buf, SESSION_ID_OFFSET).unwrap_or_default()
    }

    /// Returns PossDupFlag.
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.buf[POSS_DUP_OFFSET] != 0
    }

    /// Reads a one byte template field at `offset` past the common block.
    #[must_use]
    pub fn fixed_u8(&self, offset: usize) -> u8 {
        self.buf
            .get(FIXED_OFFSET + offset)
            .copied()
            .unwrap_or_default()
    }

    /// Reads a four byte template field at `offset` past the common block.
    #[must_use]
    pub fn fixed_u32(&self, offset: usize) -> u32 {
        read_u32(self.buf, FIXED_OFFSET + offset).unwrap_or_default()
    }

    /// Reads an eight byte template field at `offset` past the common block.
    #[must_use]
    pub fn fixed_u64(&self, offset: usize) -> u64 {
        read_u64(self.buf, FIXED_OFFSET + offset).unwrap_or_default()
    }

    /// Returns an iterator over the TLVs.
    #[must_use]
    pub fn tlvs(&self) -> TlvIter<'a> {
        TlvIter {
            buf: self.buf,
            offset: self.tlv_start,
        }
    }

    /// Returns the value of the first TLV with `tag`.
    ///
    /// # Errors
    /// Returns `BinaryError::Tlv` if a TLV before it is malformed.
    pub fn tlv(&self, tag: u16) -> Result<Option<&'a [u8]>, BinaryError> {
        for tlv in self.tlvs() {
            let tlv = tlv?;
            if tlv.tag == tag {
                return Ok(Some(tlv.value));
            }
        }
        Ok(None)
    }

    /// Returns the value of the first TLV with `tag` as UTF-8.
    ///
    /// # Errors
    /// Returns `BinaryError` if the TLVs are malformed or the value is not UTF-8.
    pub fn tlv_str(&self, tag: u16) -> Result<Option<&'a str>, BinaryError> {
        self.tlv(tag)?
            .map(|value| {
                std::str::from_utf8(value).map_err(|e| BinaryError::InvalidValue {
                    tag,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Iterator over the TLVs of a frame.
///
/// Stops after yielding the first error.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<Tlv<'a>, BinaryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }
        let header = self.offset;
        let parsed = read_u16(self.buf, header).zip(read_u16(self.buf, header + 2));
        let Some((tag, len)) = parsed else {
            self.offset = self.buf.len();
            return Some(Err(BinaryError::Tlv { offset: header }));
        };

        let start = header + TLV_HEADER_LEN;
        let end = start + usize::from(len);
        let Some(value) = self.buf.get(start..end) else {
            self.offset = self.buf.len();
            return Some(Err(BinaryError::Tlv { offset: header }));
        };
        self.offset = end;
        Some(Ok(Tlv {
            tag,
            value,
            offset: start,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(seq: u64) -> CommonBlock {
        CommonBlock {
            msg_seq_num: seq,
            sending_time: 1_000,
            session_id: 7,
            poss_dup: false,
        }
    }

    #[test]
    fn test_encode_and_view() {
        let mut buf = BytesMut::new();
        let mut encoder = BinaryEncoder::new(&mut buf, Template::RetransmitRequest, &common(3));
        encoder.put_fixed_u64(10);
        encoder.put_fixed_u64(0);
        let range = encoder.finish().unwrap();

        let frame = BinaryFrame::parse(&buf[range]).unwrap();
        assert_eq!(frame.template(), Template::RetransmitRequest);
        assert_eq!(frame.msg_seq_num(), 3);
        assert_eq!(frame.sending_time(), 1_000);
        assert_eq!(frame.session_id(), 7);
        assert!(!frame.poss_dup());
        assert_eq!(frame.fixed_u64(0), 10);
        assert_eq!(frame.fixed_u64(8), 0);
        assert_eq!(frame.tlvs().count(), 0);
    }

    #[test]
    fn test_tlvs_follow_padded_block() {
        let mut buf = BytesMut::new();
        let mut encoder = BinaryEncoder::new(&mut buf, Template::Establish, &common(1));
        encoder.put_str(49, "CLIENT");
        encoder.put_uint(38, 100);
        let range = encoder.finish().unwrap();

        let frame = BinaryFrame::parse(&buf[range]).unwrap();
        assert_eq!(frame.fixed_u32(0), 0);
        assert_eq!(frame.tlv_str(49).unwrap(), Some("CLIENT"));
        assert_eq!(frame.tlv(38).unwrap(), Some(&b"100"[..]));
        assert_eq!(frame.tlv(56).unwrap(), None);

        let tlv = frame.tlvs().next().unwrap().unwrap();
        assert_eq!(&frame.as_bytes()[tlv.range()], b"CLIENT");
    }

    #[test]
    fn test_oversized_tlv_fails_finish() {
        let mut buf = BytesMut::new();
        let mut encoder = BinaryEncoder::new(&mut buf, Template::Business(100), &common(1));
        encoder.put_raw(58, &vec![b'x'; 70_000]);
        assert!(matches!(
            encoder.finish(),
            Err(EncodeError::FieldTooLong { tag: 58, .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_frames() {
        let mut buf = BytesMut::new();
        let encoder = BinaryEncoder::new(&mut buf, Template::Sequence, &common(1));
        let range = encoder.finish().unwrap();
        let good = buf[range].to_vec();

        assert!(matches!(
            BinaryFrame::parse(&good[..20]),
            Err(BinaryError::Truncated { .. })
        ));

        let mut longer = good.clone();
        longer.push(0);
        assert!(matches!(
            BinaryFrame::parse(&longer),
            Err(BinaryError::LengthMismatch { .. })
        ));

        let mut bad_encoding = good.clone();
        bad_encoding[4] = 0x50;
        assert_eq!(
            BinaryFrame::parse(&bad_encoding).err(),
            Some(BinaryError::EncodingType(0x5050))
        );

        let mut bad_template = good.clone();
        bad_template[SOFH_LEN + 2] = 42;
        assert_eq!(
            BinaryFrame::parse(&bad_template).err(),
            Some(BinaryError::UnknownTemplate(42))
        );

        let mut bad_tlv = good;
        bad_tlv.extend_from_slice(&[58, 0, 10, 0, b'x']);
        let len = bad_tlv.len() as u32;
        bad_tlv[..4].copy_from_slice(&len.to_be_bytes());
        let frame = BinaryFrame::parse(&bad_tlv).unwrap();
        assert!(matches!(frame.tlv(58), Err(BinaryError::Tlv { .. })));
    }
}
